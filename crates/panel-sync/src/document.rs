//! Document: the panel's JSON configuration tree, keyed by section name.
//!
//! Each top-level key is a section edited by one panel screen (`albums`,
//! `songs`, `wordle`, ...). The set of keys is open: unknown sections are
//! carried through load, save and export untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Sections the mobile app reads today.
pub const KNOWN_SECTIONS: &[&str] = &[
    "app",
    "albums",
    "calendars",
    "songs",
    "wordle",
    "jubileo",
    "activities",
];

/// The word-game section, owned jointly with the game's own backend.
pub const WORDLE_SECTION: &str = "wordle";

/// Field stamped on every section value by `update_section`.
pub const UPDATED_AT: &str = "updatedAt";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Invalid JSON: {0}")]
    Parse(String),

    #[error("Document root must be a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("Section value must be an object or array, found {0}")]
    InvalidSectionValue(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DocumentError>;

/// The full panel document.
///
/// Sections are kept in a `BTreeMap` so serialization order is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    sections: BTreeMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a parsed JSON value. The root must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self {
                sections: map.into_iter().collect(),
            }),
            other => Err(DocumentError::NotAnObject(kind_of(&other))),
        }
    }

    /// Build from a remote root snapshot.
    ///
    /// An empty database has a `null` root; anything that is not an object
    /// is treated as an empty document.
    pub fn from_remote_value(value: Value) -> Self {
        Self::from_value(value).unwrap_or_default()
    }

    /// Parse JSON text (import files, local storage blobs).
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| DocumentError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    /// Pretty-printed JSON (two-space indent, sorted keys).
    pub fn to_pretty_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.sections)
            .map_err(|e| DocumentError::Serialization(e.to_string()))
    }

    /// Compact JSON, used for the single local storage blob.
    pub fn to_compact_json(&self) -> Result<String> {
        serde_json::to_string(&self.sections)
            .map_err(|e| DocumentError::Serialization(e.to_string()))
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.sections
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    pub fn get(&self, section: &str) -> Option<&Value> {
        self.sections.get(section)
    }

    pub fn insert(&mut self, section: impl Into<String>, value: Value) -> Option<Value> {
        self.sections.insert(section.into(), value)
    }

    pub fn contains(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.sections.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Sidebar status for a section.
    pub fn section_status(&self, section: &str) -> SectionStatus {
        match self.sections.get(section) {
            Some(value) => section_status_of(section, value),
            None => SectionStatus::Empty,
        }
    }
}

/// Whether a section has content worth showing as active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SectionStatus {
    Active,
    Empty,
}

fn section_status_of(section: &str, value: &Value) -> SectionStatus {
    let active = if section == "app" {
        // app counts feedback entries across all categories
        value
            .get("feedback")
            .and_then(Value::as_object)
            .map(|categories| {
                categories
                    .values()
                    .filter_map(Value::as_object)
                    .map(Map::len)
                    .sum::<usize>()
            })
            .unwrap_or(0)
            > 0
    } else if let Some(data) = value.get("data").filter(|d| !d.is_null()) {
        match data {
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
            _ => false,
        }
    } else {
        match value {
            Value::Object(map) => !map.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Null => false,
            _ => true,
        }
    };

    if active {
        SectionStatus::Active
    } else {
        SectionStatus::Empty
    }
}

/// Stamp a section value with `updatedAt`.
///
/// Objects get the field inserted (replacing any existing one). Arrays are
/// spread into an index-keyed object first, which is the shape section
/// editors have always produced for list payloads. Scalars are rejected.
pub fn stamp_section(value: Value, updated_at: &str) -> Result<Value> {
    let mut map = match value {
        Value::Object(map) => map,
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        other => return Err(DocumentError::InvalidSectionValue(kind_of(&other))),
    };
    map.insert(UPDATED_AT.to_string(), Value::String(updated_at.to_string()));
    Ok(Value::Object(map))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rejects_non_object_root() {
        let err = Document::from_json_bytes(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, DocumentError::NotAnObject("array")));

        let err = Document::from_json_bytes(b"{ not json").unwrap_err();
        assert!(matches!(err, DocumentError::Parse(_)));
    }

    #[test]
    fn test_unknown_sections_preserved() {
        let doc =
            Document::from_json_bytes(br#"{"albums": {"data": []}, "future-module": {"x": 1}}"#)
                .unwrap();
        assert!(doc.contains("future-module"));
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_pretty_json_is_sorted_and_indented() {
        let mut doc = Document::new();
        doc.insert("songs", json!({"b": 1, "a": 2}));
        doc.insert("albums", json!({}));

        let text = String::from_utf8(doc.to_pretty_json().unwrap()).unwrap();
        assert!(text.find("\"albums\"").unwrap() < text.find("\"songs\"").unwrap());
        assert!(text.find("\"a\"").unwrap() < text.find("\"b\"").unwrap());
        assert!(text.contains("\n  \"albums\""));
    }

    #[test]
    fn test_remote_null_root_is_empty() {
        assert!(Document::from_remote_value(Value::Null).is_empty());
        assert!(Document::from_remote_value(json!("oops")).is_empty());
    }

    #[test]
    fn test_stamp_object_overwrites_updated_at() {
        let stamped = stamp_section(json!({"data": [1], "updatedAt": "old"}), "new").unwrap();
        assert_eq!(stamped, json!({"data": [1], "updatedAt": "new"}));
    }

    #[test]
    fn test_stamp_array_spreads_indices() {
        let stamped = stamp_section(json!(["a", "b"]), "t").unwrap();
        assert_eq!(stamped, json!({"0": "a", "1": "b", "updatedAt": "t"}));
    }

    #[test]
    fn test_stamp_rejects_scalars() {
        assert!(stamp_section(json!(42), "t").is_err());
        assert!(stamp_section(Value::Null, "t").is_err());
    }

    #[test]
    fn test_section_status_rules() {
        let doc = Document::from_value(json!({
            "app": {"feedback": {"bugs": {}, "ideas": {"k1": {"text": "hi"}}}},
            "albums": {"data": []},
            "songs": {"data": {"s1": {}}},
            "calendars": {"updatedAt": "t"},
            "jubileo": {},
        }))
        .unwrap();

        assert_eq!(doc.section_status("app"), SectionStatus::Active);
        assert_eq!(doc.section_status("albums"), SectionStatus::Empty);
        assert_eq!(doc.section_status("songs"), SectionStatus::Active);
        assert_eq!(doc.section_status("calendars"), SectionStatus::Active);
        assert_eq!(doc.section_status("jubileo"), SectionStatus::Empty);
        assert_eq!(doc.section_status("wordle"), SectionStatus::Empty);
    }

    #[test]
    fn test_app_without_feedback_is_empty() {
        let doc = Document::from_value(json!({"app": {"version": "1.2"}})).unwrap();
        assert_eq!(doc.section_status("app"), SectionStatus::Empty);
    }
}
