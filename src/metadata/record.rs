use chrono::{DateTime, FixedOffset};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use super::value::{get_path, insert_path, MetaValue, MetadataMap};
use crate::schema::DatasetType;

/// Reserved top-level keys of the flat record view
pub mod keys {
    /// Dataset type (closed vocabulary)
    pub const DATASET_TYPE: &str = "DatasetType";
    /// Free-text data type, e.g. `SEM_Imaging`
    pub const DATA_TYPE: &str = "Data Type";
    /// ISO-8601 timestamp with offset
    pub const CREATION_TIME: &str = "Creation Time";
    /// Resolved instrument identity (nullable)
    pub const INSTRUMENT_ID: &str = "Instrument ID";
    /// Ordered list of flagged fields and recovery notes
    pub const WARNINGS: &str = "warnings";
    /// Zero-based index of the signal inside a multi-signal container
    pub const SIGNAL_INDEX: &str = "Signal Index";
    /// Number of signals in the container
    pub const SIGNAL_COUNT: &str = "Signal Count";

    /// Every key the flat view fills in itself
    pub const RESERVED: [&str; 7] = [
        DATASET_TYPE,
        DATA_TYPE,
        CREATION_TIME,
        INSTRUMENT_ID,
        WARNINGS,
        SIGNAL_INDEX,
        SIGNAL_COUNT,
    ];

    /// Name a vendor field takes when it collides with a reserved key
    pub fn vendor_alias(key: &str) -> String {
        format!("{key} (vendor)")
    }
}

/// Loosely-typed per-signal metadata produced by a decoder.
///
/// The mandatory entries are typed fields; everything else lives in
/// [`RawRecord::fields`]. [`RawRecord::to_map`] renders the flat view where
/// the mandatory entries appear under the [`keys`] names.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Dataset type of this signal
    pub dataset_type: DatasetType,

    /// Free-text data type (e.g. `STEM_Imaging`, `EDS_Spectrum`)
    pub data_type: String,

    /// Acquisition or file-modification time, always with an offset
    pub creation_time: DateTime<FixedOffset>,

    /// Resolved instrument, `None` when lookup was unavailable
    pub instrument_id: Option<String>,

    /// Flagged field names and recovery notes, in insertion order
    pub warnings: Vec<String>,

    /// Decoded fields: canonical names for core candidates, vendor names otherwise
    pub fields: MetadataMap,

    /// Output key -> vendor key, recorded by field descriptors
    pub provenance: BTreeMap<String, String>,

    /// Index of this signal inside its container (multi-signal formats only)
    pub signal_index: Option<usize>,

    /// Number of signals the container holds
    pub signal_count: usize,
}

impl RawRecord {
    /// Create a record with no fields
    pub fn new(
        dataset_type: DatasetType,
        data_type: impl Into<String>,
        creation_time: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            dataset_type,
            data_type: data_type.into(),
            creation_time,
            instrument_id: None,
            warnings: Vec::new(),
            fields: MetadataMap::new(),
            provenance: BTreeMap::new(),
            signal_index: None,
            signal_count: 1,
        }
    }

    /// Set the instrument identity
    pub fn with_instrument_id(mut self, instrument_id: Option<String>) -> Self {
        self.instrument_id = instrument_id;
        self
    }

    /// Set a top-level field
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Set a nested field
    pub fn set_path<S: AsRef<str>>(&mut self, path: &[S], value: impl Into<MetaValue>) {
        insert_path(&mut self.fields, path, value.into());
    }

    /// Top-level field
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.fields.get(key)
    }

    /// Nested field
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&MetaValue> {
        get_path(&self.fields, path)
    }

    /// Append a warning unless it is already present
    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    /// Remember which vendor key produced an output key
    pub fn record_source(&mut self, output_key: impl Into<String>, source_key: impl Into<String>) {
        self.provenance.insert(output_key.into(), source_key.into());
    }

    /// Vendor key that produced `output_key`, if recorded
    pub fn source_of(&self, output_key: &str) -> Option<&str> {
        self.provenance.get(output_key).map(String::as_str)
    }

    /// Flat mapping view with the reserved keys filled in.
    ///
    /// A vendor field named like a reserved key is kept under
    /// [`keys::vendor_alias`] instead of being overwritten.
    pub fn to_map(&self) -> MetadataMap {
        let mut map = MetadataMap::new();
        for (key, value) in &self.fields {
            if keys::RESERVED.contains(&key.as_str()) {
                let alias = keys::vendor_alias(key);
                log::debug!("vendor field {key:?} collides with a reserved key, kept as {alias:?}");
                map.insert(alias, value.clone());
            } else {
                map.insert(key.clone(), value.clone());
            }
        }
        map.insert(
            keys::DATASET_TYPE.to_string(),
            MetaValue::Text(self.dataset_type.to_string()),
        );
        map.insert(keys::DATA_TYPE.to_string(), MetaValue::Text(self.data_type.clone()));
        map.insert(
            keys::CREATION_TIME.to_string(),
            MetaValue::Text(self.creation_time.to_rfc3339()),
        );
        map.insert(
            keys::INSTRUMENT_ID.to_string(),
            self.instrument_id.clone().into(),
        );
        map.insert(
            keys::WARNINGS.to_string(),
            MetaValue::List(self.warnings.iter().cloned().map(MetaValue::Text).collect()),
        );
        if let Some(index) = self.signal_index {
            map.insert(keys::SIGNAL_INDEX.to_string(), index.into());
            map.insert(keys::SIGNAL_COUNT.to_string(), self.signal_count.into());
        }
        map
    }

    /// Serialize the flat view to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for RawRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}
