use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::units::Quantity;

/// Ordered mapping from field name to value; the shape of every metadata tree.
pub type MetadataMap = BTreeMap<String, MetaValue>;

/// A loosely-typed metadata value as produced by a decoder.
///
/// Serializes untagged, so a record renders as plain JSON with quantities as
/// `{"value": …, "units": …}` objects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    /// Explicit absence (e.g. an unresolved instrument)
    Null,
    /// Boolean flag
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating-point value without a unit
    Float(f64),
    /// Free text
    Text(String),
    /// Magnitude with a unit
    Quantity(Quantity),
    /// Ordered list
    List(Vec<MetaValue>),
    /// Nested mapping
    Map(MetadataMap),
}

impl MetaValue {
    /// Text content, if this is a text value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric content of ints, floats and numeric text
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Int(v) => Some(*v as f64),
            MetaValue::Float(v) => Some(*v),
            MetaValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Quantity content, if this is a quantity
    pub fn as_quantity(&self) -> Option<&Quantity> {
        match self {
            MetaValue::Quantity(q) => Some(q),
            _ => None,
        }
    }

    /// Nested mapping, if this is a map
    pub fn as_map(&self) -> Option<&MetadataMap> {
        match self {
            MetaValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Whether this is [`MetaValue::Null`]
    pub fn is_null(&self) -> bool {
        matches!(self, MetaValue::Null)
    }

    /// Short name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            MetaValue::Null => "null",
            MetaValue::Bool(_) => "bool",
            MetaValue::Int(_) => "integer",
            MetaValue::Float(_) => "float",
            MetaValue::Text(_) => "text",
            MetaValue::Quantity(_) => "quantity",
            MetaValue::List(_) => "list",
            MetaValue::Map(_) => "map",
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Null => f.write_str("null"),
            MetaValue::Bool(v) => write!(f, "{v}"),
            MetaValue::Int(v) => write!(f, "{v}"),
            MetaValue::Float(v) => write!(f, "{v}"),
            MetaValue::Text(v) => f.write_str(v),
            MetaValue::Quantity(q) => write!(f, "{q}"),
            MetaValue::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            MetaValue::Map(map) => write!(f, "{{{} entries}}", map.len()),
        }
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<u32> for MetaValue {
    fn from(value: u32) -> Self {
        MetaValue::Int(i64::from(value))
    }
}

impl From<usize> for MetaValue {
    fn from(value: usize) -> Self {
        MetaValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Float(value)
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Text(value)
    }
}

impl From<Quantity> for MetaValue {
    fn from(value: Quantity) -> Self {
        MetaValue::Quantity(value)
    }
}

impl From<MetadataMap> for MetaValue {
    fn from(value: MetadataMap) -> Self {
        MetaValue::Map(value)
    }
}

impl From<Vec<MetaValue>> for MetaValue {
    fn from(value: Vec<MetaValue>) -> Self {
        MetaValue::List(value)
    }
}

impl<T: Into<MetaValue>> From<Option<T>> for MetaValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(MetaValue::Null, Into::into)
    }
}

/// Insert `value` at a nested `path`, creating intermediate maps as needed.
///
/// An intermediate entry that is not a map is replaced by one.
pub fn insert_path<S: AsRef<str>>(map: &mut MetadataMap, path: &[S], value: MetaValue) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = map;
    for key in parents {
        let entry = current
            .entry(key.as_ref().to_string())
            .or_insert_with(|| MetaValue::Map(MetadataMap::new()));
        if !matches!(entry, MetaValue::Map(_)) {
            *entry = MetaValue::Map(MetadataMap::new());
        }
        current = match entry {
            MetaValue::Map(inner) => inner,
            _ => return,
        };
    }
    current.insert(last.as_ref().to_string(), value);
}

/// Look up a value at a nested `path`.
pub fn get_path<'a, S: AsRef<str>>(map: &'a MetadataMap, path: &[S]) -> Option<&'a MetaValue> {
    let (last, parents) = path.split_last()?;
    let mut current = map;
    for key in parents {
        current = current.get(key.as_ref())?.as_map()?;
    }
    current.get(last.as_ref())
}

/// Whether a nested `path` holds a value.
pub fn contains_path<S: AsRef<str>>(map: &MetadataMap, path: &[S]) -> bool {
    get_path(map, path).is_some()
}
