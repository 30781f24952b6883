use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single enrichment field value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// An empty string or empty list carries no information; numbers and
    /// booleans always do.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Integer(_) | FieldValue::Float(_) | FieldValue::Bool(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
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

/// A key/value record produced by one enrichment source.
///
/// Every scraper and LLM adapter returns one of these; the orchestrator
/// merges them into the lead record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SourcePayload {
    fields: HashMap<String, FieldValue>,
}

impl SourcePayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the payload counts as a valid result: at least one field
    /// with a populated value. Empty payloads are treated as failures by
    /// the scheduler, not silent successes.
    pub fn has_content(&self) -> bool {
        self.fields.values().any(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Text value of a field, if present and non-empty.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(FieldValue::as_text)
            .filter(|s| !s.trim().is_empty())
    }

    /// Folds `other` into `self`. Only populated values overwrite; an
    /// empty field never clobbers data already collected.
    pub fn merge(&mut self, other: &SourcePayload) {
        for (key, value) in &other.fields {
            if !value.is_empty() {
                self.fields.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for SourcePayload {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_has_no_content() {
        assert!(!SourcePayload::new().has_content());
    }

    #[test]
    fn test_blank_fields_have_no_content() {
        let payload = SourcePayload::new().with("email", "").with("phone", "   ");
        assert!(!payload.has_content());
    }

    #[test]
    fn test_one_populated_field_is_enough() {
        let payload = SourcePayload::new()
            .with("email", "")
            .with("phone", "+55 11 99999-0000");
        assert!(payload.has_content());
    }

    #[test]
    fn test_numeric_fields_always_count() {
        let payload = SourcePayload::new().with("followers", 0i64);
        assert!(payload.has_content());
    }

    #[test]
    fn test_merge_skips_empty_values() {
        let mut base = SourcePayload::new().with("email", "x@y.com");
        let update = SourcePayload::new().with("email", "").with("website", "https://y.com");
        base.merge(&update);

        assert_eq!(base.text("email"), Some("x@y.com"));
        assert_eq!(base.text("website"), Some("https://y.com"));
    }
}
