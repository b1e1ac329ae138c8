//! Structured records: named fields with scalar values

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Value type for record fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(fl) => write!(f, "{}", fl),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Null => write!(f, "null"),
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Int(i as i64)
    }
}

impl From<u32> for FieldValue {
    fn from(i: u32) -> Self {
        FieldValue::Int(i as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// One structured log record: field name to value
///
/// Field order is irrelevant; the destination's column order decides the
/// positional layout when the record becomes a row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: HashMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self {
            fields: HashMap::new(),
        }
    }

    /// Add a field to the record
    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Add a field to the record (mutable version)
    pub fn insert<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &HashMap<String, FieldValue> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Format fields as key=value pairs, sorted by key
    pub fn format_fields(&self) -> String {
        let mut pairs: Vec<_> = self.fields.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_fields())
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<HashMap<String, FieldValue>> for Record {
    fn from(fields: HashMap<String, FieldValue>) -> Self {
        Self { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_with_fields() {
        let record = Record::new()
            .with_field("remote_addr", "10.0.0.1")
            .with_field("bytes_sent", 512)
            .with_field("cached", true);

        assert_eq!(record.len(), 3);
        assert_eq!(record.get("bytes_sent"), Some(&FieldValue::Int(512)));
        assert!(record.get("status").is_none());
    }

    #[test]
    fn test_record_format_is_sorted() {
        let record = Record::new().with_field("b", 2).with_field("a", "x");
        assert_eq!(record.format_fields(), "a=x b=2");
    }

    #[test]
    fn test_record_from_iter() {
        let record: Record = vec![("status", 200), ("bytes_sent", 10)].into_iter().collect();
        assert_eq!(record.get("status"), Some(&FieldValue::Int(200)));
    }

    #[test]
    fn test_record_deserializes_from_json_object() {
        let record: Record =
            serde_json::from_str(r#"{"status":"200","bytes_sent":42,"ratio":0.5,"gone":null}"#)
                .unwrap();

        assert_eq!(record.get("status"), Some(&FieldValue::String("200".into())));
        assert_eq!(record.get("bytes_sent"), Some(&FieldValue::Int(42)));
        assert_eq!(record.get("ratio"), Some(&FieldValue::Float(0.5)));
        assert_eq!(record.get("gone"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_none_becomes_null() {
        assert_eq!(FieldValue::from(None::<i64>), FieldValue::Null);
        assert_eq!(FieldValue::from(Some(7i64)), FieldValue::Int(7));
    }
}
