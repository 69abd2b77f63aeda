//! Raw documents as delivered by the remote store.
//!
//! The remote schema is not checked at compile time: a document is an id plus
//! a map of named primitive fields. Typed access goes through the getters,
//! which return `None` on a missing field or a field of the wrong kind.

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A single field value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    String(String),
    Number(f64),
    Timestamp(Timestamp),
    Bool(bool),
    StringArray(Vec<String>),
    Null,
}

impl FieldValue {
    /// Ordering used by query evaluation. Values of different kinds order by
    /// kind, mirroring how document stores order mixed-type fields.
    pub fn cmp_for_query(&self, other: &FieldValue) -> Ordering {
        use FieldValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Number(a), Number(b)) => a.total_cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (StringArray(a), StringArray(b)) => a.cmp(b),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            FieldValue::Null => 0,
            FieldValue::Bool(_) => 1,
            FieldValue::Number(_) => 2,
            FieldValue::Timestamp(_) => 3,
            FieldValue::String(_) => 4,
            FieldValue::StringArray(_) => 5,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<Timestamp> for FieldValue {
    fn from(v: Timestamp) -> Self {
        FieldValue::Timestamp(v)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(v: Vec<String>) -> Self {
        FieldValue::StringArray(v)
    }
}

/// Named fields of a document.
pub type Fields = BTreeMap<String, FieldValue>;

/// A document from a remote collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Fields::new(),
        }
    }

    pub fn from_fields(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Builder-style field removal.
    pub fn without(mut self, name: &str) -> Self {
        self.fields.remove(name);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FieldValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.fields.get(name) {
            Some(FieldValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn get_timestamp(&self, name: &str) -> Option<Timestamp> {
        match self.fields.get(name) {
            Some(FieldValue::Timestamp(t)) => Some(*t),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.fields.get(name) {
            Some(FieldValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn get_string_array(&self, name: &str) -> Option<&[String]> {
        match self.fields.get(name) {
            Some(FieldValue::StringArray(v)) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters_reject_wrong_kind() {
        let doc = Document::new("d1")
            .with("title", "Broken heater")
            .with("lat", 41.0)
            .with("tags", vec!["a".to_string()]);

        assert_eq!(doc.get_str("title"), Some("Broken heater"));
        assert_eq!(doc.get_f64("title"), None);
        assert_eq!(doc.get_f64("lat"), Some(41.0));
        assert_eq!(doc.get_string_array("tags").map(|t| t.len()), Some(1));
        assert_eq!(doc.get_bool("missing"), None);
    }

    #[test]
    fn test_query_ordering_across_kinds() {
        let a = FieldValue::Timestamp(Timestamp(5));
        let b = FieldValue::Timestamp(Timestamp(9));
        assert_eq!(a.cmp_for_query(&b), Ordering::Less);
        assert_eq!(
            FieldValue::Null.cmp_for_query(&FieldValue::String("x".into())),
            Ordering::Less
        );
    }

    #[test]
    fn test_document_json_shape() {
        let doc = Document::new("d1").with("ok", true);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["fields"]["ok"]["type"], "bool");
        assert_eq!(json["fields"]["ok"]["value"], true);
    }
}
