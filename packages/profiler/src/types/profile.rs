//! The institution profile record and its polymorphic field values.
//!
//! The source data is sparse: any field may be absent, and a present field
//! may be a string, a number, a list, or a nested record (e.g. `leadership`
//! is a list of `{name, title}` records). Absent fields are omitted from the
//! map rather than stored as nulls.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::schema::{self, FieldClass, InstitutionType};

/// A polymorphic field value, parsed once at the extractor boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Number(f64),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
}

impl Value {
    /// Whether this value counts as populated.
    ///
    /// Empty strings, the usual "don't know" sentinels, empty containers,
    /// and zero all count as absent.
    pub fn is_populated(&self) -> bool {
        match self {
            Value::Text(s) => {
                let t = s.trim();
                !t.is_empty()
                    && !matches!(
                        t.to_lowercase().as_str(),
                        "unknown" | "n/a" | "not available" | "none" | "null"
                    )
            }
            Value::Number(n) => *n != 0.0,
            Value::List(items) => !items.is_empty(),
            Value::Record(map) => !map.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

/// A sparse institution record restricted to the frozen schema.
///
/// Field order is stable (BTreeMap) so serialized profiles diff cleanly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstitutionProfile {
    fields: BTreeMap<String, Value>,
}

impl InstitutionProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field. Returns `false` (and stores nothing) when the name is
    /// not in the schema or the value is unpopulated.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        if !schema::is_schema_field(name) || !value.is_populated() {
            return false;
        }
        self.fields.insert(name.to_string(), value);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The record's institution type, read from its `type` field.
    pub fn institution_type(&self) -> Option<InstitutionType> {
        self.get("type")
            .and_then(Value::as_text)
            .and_then(InstitutionType::parse)
    }

    /// Count populated fields in a class, restricted to fields eligible for
    /// the given institution type.
    pub fn populated_in_class(&self, class: FieldClass, institution_type: InstitutionType) -> usize {
        schema::FIELDS
            .iter()
            .filter(|f| f.class == class && schema::field_eligible(f, institution_type))
            .filter(|f| self.get(f.name).map(Value::is_populated).unwrap_or(false))
            .count()
    }

    /// First field not in the frozen schema, if any.
    ///
    /// `set` enforces the schema, but deserialized profiles (cache files)
    /// can carry arbitrary keys; callers treat any as a schema mismatch.
    pub fn first_unknown_field(&self) -> Option<&str> {
        self.fields
            .keys()
            .map(String::as_str)
            .find(|k| !schema::is_schema_field(k))
    }

    /// Merge fields from `other`, keeping existing values on conflict.
    pub fn merge_missing(&mut self, other: &InstitutionProfile) {
        for (name, value) in other.iter() {
            if !self.contains(name) {
                self.fields.insert(name.to_string(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_values_count_as_absent() {
        assert!(!Value::Text("Unknown".into()).is_populated());
        assert!(!Value::Text("  n/a ".into()).is_populated());
        assert!(!Value::Text("".into()).is_populated());
        assert!(Value::Text("Harvard University".into()).is_populated());
        assert!(!Value::List(vec![]).is_populated());
        assert!(Value::Number(1891.0).is_populated());
        assert!(!Value::Number(0.0).is_populated());
    }

    #[test]
    fn set_rejects_unknown_fields_and_sentinels() {
        let mut profile = InstitutionProfile::new();
        assert!(profile.set("name", "Example University"));
        assert!(!profile.set("not_a_field", "value"));
        assert!(!profile.set("website", "unknown"));
        assert_eq!(profile.len(), 1);
    }

    #[test]
    fn institution_type_reads_type_field() {
        let mut profile = InstitutionProfile::new();
        profile.set("type", "bank");
        assert_eq!(profile.institution_type(), Some(InstitutionType::Bank));
    }

    #[test]
    fn nested_values_round_trip_through_json() {
        let mut leader = BTreeMap::new();
        leader.insert("name".to_string(), Value::Text("A. Chancellor".into()));
        leader.insert("title".to_string(), Value::Text("Provost".into()));

        let mut profile = InstitutionProfile::new();
        profile.set("leadership", Value::List(vec![Value::Record(leader)]));

        let json = serde_json::to_string(&profile).unwrap();
        let back: InstitutionProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(profile, back);
    }

    #[test]
    fn deserialized_profiles_can_reveal_unknown_fields() {
        let profile: InstitutionProfile =
            serde_json::from_str(r#"{"name": "X", "mascot": "owl"}"#).unwrap();
        assert_eq!(profile.first_unknown_field(), Some("mascot"));

        let clean: InstitutionProfile = serde_json::from_str(r#"{"name": "X"}"#).unwrap();
        assert_eq!(clean.first_unknown_field(), None);
    }

    #[test]
    fn merge_missing_keeps_existing() {
        let mut a = InstitutionProfile::new();
        a.set("name", "Kept Name");

        let mut b = InstitutionProfile::new();
        b.set("name", "Other Name");
        b.set("website", "https://example.edu");

        a.merge_missing(&b);
        assert_eq!(a.get("name").unwrap().as_text(), Some("Kept Name"));
        assert!(a.contains("website"));
    }
}
