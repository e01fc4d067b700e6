use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::Serialize;

use super::fields::{field_spec, stage_axis, FieldKind, FieldSpec};
use super::{DatasetType, SchemaError};
use crate::metadata::{keys, MetaValue, MetadataMap, RawRecord};

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Schema-validated metadata for one signal.
///
/// Core fields are checked against the dataset type's declarations and
/// normalized to their preferred units; everything else lives in
/// `extensions`. Construction is strict: [`CanonicalMetadata::set`] rejects
/// undeclared names, so routing must be explicit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalMetadata {
    creation_time: DateTime<FixedOffset>,
    data_type: String,
    dataset_type: DatasetType,
    #[serde(flatten)]
    fields: MetadataMap,
    #[serde(skip_serializing_if = "MetadataMap::is_empty")]
    extensions: MetadataMap,
}

/// Parse an ISO-8601 timestamp that must carry an offset or `Z`.
pub(crate) fn parse_creation_time(text: &str) -> Result<DateTime<FixedOffset>, SchemaError> {
    let text = text.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Ok(time);
    }
    if NAIVE_FORMATS
        .iter()
        .any(|format| NaiveDateTime::parse_from_str(text, format).is_ok())
    {
        return Err(SchemaError::MissingTimezone(text.to_string()));
    }
    Err(SchemaError::InvalidTimestamp(text.to_string()))
}

impl CanonicalMetadata {
    /// Validate the required fields. `creation_time` is ISO-8601 text with an offset.
    pub fn new(
        dataset_type: DatasetType,
        data_type: impl Into<String>,
        creation_time: &str,
    ) -> Result<Self, SchemaError> {
        Self::with_time(dataset_type, data_type, parse_creation_time(creation_time)?)
    }

    /// Like [`new`](Self::new) with an already-parsed timestamp
    pub fn with_time(
        dataset_type: DatasetType,
        data_type: impl Into<String>,
        creation_time: DateTime<FixedOffset>,
    ) -> Result<Self, SchemaError> {
        let data_type = data_type.into();
        if data_type.trim().is_empty() {
            return Err(SchemaError::EmptyDataType);
        }
        Ok(Self {
            creation_time,
            data_type,
            dataset_type,
            fields: MetadataMap::new(),
            extensions: MetadataMap::new(),
        })
    }

    /// Dataset type
    pub fn dataset_type(&self) -> DatasetType {
        self.dataset_type
    }

    /// Free-text data type
    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    /// Creation time
    pub fn creation_time(&self) -> DateTime<FixedOffset> {
        self.creation_time
    }

    /// Optional core field
    pub fn get(&self, name: &str) -> Option<&MetaValue> {
        self.fields.get(name)
    }

    /// Every optional core field
    pub fn fields(&self) -> &MetadataMap {
        &self.fields
    }

    /// Extension entry
    pub fn extension(&self, name: &str) -> Option<&MetaValue> {
        self.extensions.get(name)
    }

    /// Every extension entry
    pub fn extensions(&self) -> &MetadataMap {
        &self.extensions
    }

    /// Set a core field, normalizing quantities to the preferred unit.
    ///
    /// Fails for names the dataset type does not declare and for values of
    /// the wrong shape.
    pub fn set(&mut self, name: &str, value: impl Into<MetaValue>) -> Result<(), SchemaError> {
        let spec = field_spec(name, self.dataset_type).ok_or_else(|| SchemaError::UndeclaredField {
            field: name.to_string(),
            dataset_type: self.dataset_type,
        })?;
        let value = normalize(spec, value.into(), self.dataset_type)?;
        self.fields.insert(name.to_string(), value);
        Ok(())
    }

    /// Store a value under `extensions`, verbatim
    pub fn set_extension(&mut self, name: impl Into<String>, value: impl Into<MetaValue>) {
        self.extensions.insert(name.into(), value.into());
    }

    /// Route a decoder record: core candidates that validate become core
    /// fields, everything else is kept under `extensions`.
    pub fn from_raw(record: &RawRecord) -> Result<Self, SchemaError> {
        Self::from_map(&record.to_map())
    }

    /// Route a flat record map (the [`RawRecord::to_map`] shape).
    ///
    /// Only the reserved keys can fail; no other entry is dropped.
    pub fn from_map(map: &MetadataMap) -> Result<Self, SchemaError> {
        let dataset_type: DatasetType = required(map, keys::DATASET_TYPE)?.parse()?;
        let mut canonical = Self::new(
            dataset_type,
            required(map, keys::DATA_TYPE)?,
            required(map, keys::CREATION_TIME)?,
        )?;

        for (key, value) in map {
            match key.as_str() {
                keys::DATASET_TYPE | keys::DATA_TYPE | keys::CREATION_TIME => {}
                keys::INSTRUMENT_ID => {
                    if !value.is_null() {
                        canonical.route("instrument_id", value.clone());
                    }
                }
                keys::WARNINGS => {
                    if !matches!(value, MetaValue::List(items) if items.is_empty()) {
                        canonical.route("warnings", value.clone());
                    }
                }
                "stage_position" => canonical.route_stage(value),
                _ => canonical.route(key, value.clone()),
            }
        }
        Ok(canonical)
    }

    fn route(&mut self, name: &str, value: MetaValue) {
        let Some(spec) = field_spec(name, self.dataset_type) else {
            self.extensions.insert(name.to_string(), value);
            return;
        };
        match normalize(spec, value.clone(), self.dataset_type) {
            Ok(normalized) => {
                self.fields.insert(name.to_string(), normalized);
            }
            Err(err) => {
                log::debug!("routing {name} to extensions: {err}");
                self.extensions.insert(name.to_string(), value);
            }
        }
    }

    /// Known axes go to the core `stage_position`; the rest to
    /// `extensions.stage_position`.
    fn route_stage(&mut self, value: &MetaValue) {
        let declared = field_spec("stage_position", self.dataset_type).is_some();
        let Some(axes) = value.as_map().filter(|_| declared) else {
            self.extensions.insert("stage_position".to_string(), value.clone());
            return;
        };
        let mut core = MetadataMap::new();
        let mut rest = MetadataMap::new();
        for (axis, v) in axes {
            match stage_axis(axis).map(|unit| normalize_quantity(&format!("stage_position.{axis}"), unit, v)) {
                Some(Ok(q)) => {
                    core.insert(axis.clone(), q);
                }
                _ => {
                    rest.insert(axis.clone(), v.clone());
                }
            }
        }
        if !core.is_empty() {
            self.fields.insert("stage_position".to_string(), MetaValue::Map(core));
        }
        if !rest.is_empty() {
            self.extensions.insert("stage_position".to_string(), MetaValue::Map(rest));
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to indented JSON
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn normalize_quantity(field: &str, unit: crate::units::Unit, value: &MetaValue) -> Result<MetaValue, SchemaError> {
    let quantity = value.as_quantity().ok_or_else(|| SchemaError::TypeMismatch {
        field: field.to_string(),
        expected: "quantity",
        found: value.kind(),
    })?;
    quantity
        .convert_to(unit)
        .map(MetaValue::Quantity)
        .map_err(|source| SchemaError::Unit {
            field: field.to_string(),
            source,
        })
}

fn required<'a>(map: &'a MetadataMap, key: &'static str) -> Result<&'a str, SchemaError> {
    map.get(key)
        .and_then(MetaValue::as_str)
        .ok_or(SchemaError::MissingField(key))
}

fn normalize(spec: FieldSpec, value: MetaValue, dataset_type: DatasetType) -> Result<MetaValue, SchemaError> {
    let mismatch = |expected: &'static str, value: &MetaValue| SchemaError::TypeMismatch {
        field: spec.name.to_string(),
        expected,
        found: value.kind(),
    };
    match spec.kind {
        FieldKind::Quantity(unit) => normalize_quantity(spec.name, unit, &value),
        FieldKind::Number => match value {
            MetaValue::Int(_) | MetaValue::Float(_) => Ok(value),
            other => Err(mismatch("number", &other)),
        },
        FieldKind::Text => match value {
            MetaValue::Text(_) => Ok(value),
            other => Err(mismatch("text", &other)),
        },
        FieldKind::List => match value {
            MetaValue::List(_) => Ok(value),
            other => Err(mismatch("list", &other)),
        },
        FieldKind::StagePosition => {
            let axes = value.as_map().ok_or_else(|| mismatch("mapping", &value))?;
            let mut out = MetadataMap::new();
            for (axis, v) in axes {
                let field = format!("stage_position.{axis}");
                let unit = stage_axis(axis).ok_or_else(|| SchemaError::UndeclaredField {
                    field: field.clone(),
                    dataset_type,
                })?;
                out.insert(axis.clone(), normalize_quantity(&field, unit, v)?);
            }
            Ok(MetaValue::Map(out))
        }
    }
}
