//! Nested documents sent to the search index.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::row::Scalar;

/// Value of a document field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Scalar(Scalar),
    Document(Document),
    List(Vec<Document>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl From<Option<Scalar>> for FieldValue {
    fn from(value: Option<Scalar>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Scalar)
    }
}

impl From<Option<Document>> for FieldValue {
    fn from(value: Option<Document>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Document)
    }
}

/// A mapping from field name to value, kept sorted by field name.
///
/// Serializes as a plain JSON object.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Document {
    fields: BTreeMap<String, FieldValue>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.fields.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Scalar value of a field, if it holds one.
    pub fn scalar(&self, field: &str) -> Option<&Scalar> {
        match self.fields.get(field) {
            Some(FieldValue::Scalar(value)) => Some(value),
            _ => None,
        }
    }

    /// Nested list under a field, if it holds one.
    pub fn list(&self, field: &str) -> Option<&[Document]> {
        match self.fields.get(field) {
            Some(FieldValue::List(items)) => Some(items),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        // Every field type serializes infallibly.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
