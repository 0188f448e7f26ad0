//! Metadata handed to hook observers.
//!
//! Cells attach measurements (a verified frame rate, a frame counter, a
//! validity flag) to the hook invocations they stage during a step.

use smallvec::SmallVec;
use std::fmt;

/// Possible values for metadata fields.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    /// String value.
    String(String),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
}

impl MetadataValue {
    /// Get as a float, converting integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Float(f) => Some(*f),
            MetadataValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => f.write_str(s),
            MetadataValue::Int(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// A key-value pair.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataField {
    /// Field name.
    pub key: String,
    /// Field value.
    pub value: MetadataValue,
}

/// Ordered key-value list. Fields keep the order the cell added them in, so
/// observers can also read them positionally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    fields: SmallVec<[MetadataField; 4]>,
}

impl Metadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field.
    pub fn with(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.insert(key, value);
        self
    }

    /// Add or replace a field.
    pub fn insert(&mut self, key: impl Into<String>, value: MetadataValue) {
        let key = key.into();
        match self.fields.iter_mut().find(|f| f.key == key) {
            Some(field) => field.value = value,
            None => self.fields.push(MetadataField { key, value }),
        }
    }

    /// Get a field by key.
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.fields.iter().find(|f| f.key == key).map(|f| &f.value)
    }

    /// Get a field by position.
    pub fn at(&self, index: usize) -> Option<&MetadataValue> {
        self.fields.get(index).map(|f| &f.value)
    }

    /// Iterate over fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &MetadataField> {
        self.fields.iter()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_builder() {
        let meta = Metadata::new()
            .with("frequency", MetadataValue::Float(29.5))
            .with("frames", MetadataValue::Int(12));

        assert_eq!(meta.len(), 2);
        assert_eq!(meta.get("frequency").and_then(|v| v.as_f64()), Some(29.5));
        assert_eq!(meta.at(1), Some(&MetadataValue::Int(12)));
    }

    #[test]
    fn test_insert_replaces() {
        let mut meta = Metadata::new().with("valid", MetadataValue::Bool(true));
        meta.insert("valid", MetadataValue::Bool(false));
        assert_eq!(meta.len(), 1);
        assert_eq!(meta.get("valid").and_then(|v| v.as_bool()), Some(false));
    }
}
