//! Record type and timestamp helpers.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Field holding a record's primary key.
pub const ID_FIELD: &str = "id";
/// Field holding a record's creation time.
pub const CREATED_AT_FIELD: &str = "createdAt";
/// Field holding a record's last modification time.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// A stored document: a flat JSON object whose `id` field is its primary key.
///
/// Values may be strings, numbers, booleans, arrays or nested objects.
/// Timestamps are ISO-8601 strings. This is the exact shape that export
/// produces and import consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Converts a JSON value into a record.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the value is not an object.
    pub fn from_value(value: Value) -> CoreResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(CoreError::serialization(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Serializes any `Serialize` value into a record.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if serialization fails or does not yield an object.
    pub fn from_serialize<T: Serialize>(value: &T) -> CoreResult<Self> {
        Self::from_value(serde_json::to_value(value)?)
    }

    /// Returns the record id, if it has a string one.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    /// Sets the record id.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert(ID_FIELD.to_string(), Value::String(id.into()));
    }

    /// Returns `createdAt`, if present.
    #[must_use]
    pub fn created_at(&self) -> Option<&str> {
        self.0.get(CREATED_AT_FIELD).and_then(Value::as_str)
    }

    /// Returns `updatedAt`, if present.
    #[must_use]
    pub fn updated_at(&self) -> Option<&str> {
        self.0.get(UPDATED_AT_FIELD).and_then(Value::as_str)
    }

    /// Returns a top-level field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Resolves a dotted path such as `preferences.privacy.allowAnalytics`.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Returns a string field, treating non-strings as absent.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get_path(field).and_then(Value::as_str)
    }

    /// Sets a top-level field and returns the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Sets a dotted path, creating intermediate objects as needed.
    ///
    /// Intermediate values that are not objects are replaced.
    pub fn set_path(&mut self, path: &str, value: Value) {
        let mut parts: Vec<&str> = path.split('.').collect();
        let Some(last) = parts.pop() else {
            return;
        };

        let mut current = &mut self.0;
        for part in parts {
            let slot = current
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(map) = slot else {
                return;
            };
            current = map;
        }
        current.insert(last.to_string(), value);
    }

    /// Removes a top-level field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Removes the value at a dotted path.
    pub fn remove_path(&mut self, path: &str) -> Option<Value> {
        let mut parts: Vec<&str> = path.split('.').collect();
        let last = parts.pop()?;
        let mut current = &mut self.0;
        for part in parts {
            current = current.get_mut(part)?.as_object_mut()?;
        }
        current.remove(last)
    }

    /// Iterates over the top-level fields.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Applies to this record the changes that turn `before` into `after`.
    ///
    /// Fields equal in both are left alone, fields only in `before` are
    /// removed, and changed objects are descended into so that fields of
    /// this record unknown to either side survive.
    pub fn apply_changes(&mut self, before: &Record, after: &Record) {
        apply_changes(&mut self.0, &before.0, &after.0);
    }

    /// Converts the record into a JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Deserializes the record into a typed value.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the record does not match `T`.
    pub fn to_typed<T: serde::de::DeserializeOwned>(&self) -> CoreResult<T> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Record {
    type Error = CoreError;

    fn try_from(value: Value) -> CoreResult<Self> {
        Self::from_value(value)
    }
}

/// Values the engine accepts where a record is expected.
pub trait IntoRecord {
    /// Converts `self` into a record.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the value is not a JSON object.
    fn into_record(self) -> CoreResult<Record>;
}

impl IntoRecord for Record {
    fn into_record(self) -> CoreResult<Record> {
        Ok(self)
    }
}

impl IntoRecord for Value {
    fn into_record(self) -> CoreResult<Record> {
        Record::from_value(self)
    }
}

impl IntoRecord for Map<String, Value> {
    fn into_record(self) -> CoreResult<Record> {
        Ok(Record(self))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(text) => f.write_str(&text),
            Err(_) => f.write_str("<unprintable record>"),
        }
    }
}

fn apply_changes(
    target: &mut Map<String, Value>,
    before: &Map<String, Value>,
    after: &Map<String, Value>,
) {
    for (field, new) in after {
        let old = before.get(field);
        if old == Some(new) {
            continue;
        }
        if let (Some(Value::Object(old)), Value::Object(new)) = (old, new) {
            if let Some(Value::Object(stored)) = target.get_mut(field) {
                apply_changes(stored, old, new);
                continue;
            }
        }
        target.insert(field.clone(), new.clone());
    }
    for field in before.keys() {
        if !after.contains_key(field) {
            target.remove(field);
        }
    }
}

/// Returns the current time as an ISO-8601 string with millisecond precision.
#[must_use]
pub fn now_iso() -> String {
    format_iso(Utc::now())
}

/// Formats a timestamp the way records store it (`2024-01-31T09:15:00.000Z`).
#[must_use]
pub fn format_iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an ISO-8601 timestamp.
#[must_use]
pub fn parse_iso(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Returns the current time in Unix milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Returns a fresh random record id.
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
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

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn apply_changes_touches_only_what_changed() {
        let mut stored = record(json!({
            "id": "u1",
            "role": "admin",
            "prefs": {"theme": "dark", "legacy": 1},
            "nickname": "old",
        }));
        let before = record(json!({
            "id": "u1",
            "prefs": {"theme": "dark"},
            "nickname": "old",
            "bio": "",
        }));
        let after = record(json!({"id": "u1", "prefs": {"theme": "light"}, "bio": ""}));

        stored.apply_changes(&before, &after);
        assert_eq!(
            stored,
            record(json!({"id": "u1", "role": "admin", "prefs": {"theme": "light", "legacy": 1}}))
        );
    }

    #[test]
    fn non_objects_are_rejected() {
        let err = Record::from_value(json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn dotted_paths_resolve_nested_fields() {
        let r = record(json!({
            "id": "u1",
            "preferences": {"privacy": {"allowAnalytics": true}}
        }));
        assert_eq!(r.id(), Some("u1"));
        assert_eq!(
            r.get_path("preferences.privacy.allowAnalytics"),
            Some(&json!(true))
        );
        assert_eq!(r.get_path("preferences.theme"), None);
        assert_eq!(r.get_path("id.nested"), None);
    }

    #[test]
    fn set_path_creates_intermediate_objects() {
        let mut r = record(json!({"id": "u1", "preferences": "legacy"}));
        r.set_path("preferences.privacy.allowAnalytics", json!(false));
        assert_eq!(
            r.into_value(),
            json!({"id": "u1", "preferences": {"privacy": {"allowAnalytics": false}}})
        );
    }

    #[test]
    fn remove_path_only_touches_the_leaf() {
        let mut r = record(json!({"a": {"b": 1, "c": 2}}));
        assert_eq!(r.remove_path("a.b"), Some(json!(1)));
        assert_eq!(r.remove_path("a.missing"), None);
        assert_eq!(r.into_value(), json!({"a": {"c": 2}}));
    }

    #[test]
    fn iso_timestamps_round_trip() {
        let text = now_iso();
        assert!(text.ends_with('Z'));
        let parsed = parse_iso(&text).unwrap();
        assert_eq!(format_iso(parsed), text);
        assert!(parse_iso("yesterday").is_none());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }
}
