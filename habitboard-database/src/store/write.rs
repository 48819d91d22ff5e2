use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Number, Value};

/// A stored document body. Documents are always JSON objects.
pub type Document = Map<String, Value>;

/// Location of a single document: `collection/id`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    pub collection: String,
    pub id: String,
}

impl DocumentPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Merge-write against one document.
///
/// `data` is deep-merged into the stored body: nested objects merge key by
/// key, any other value replaces what was there. `increments` are applied
/// afterwards to top-level fields.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentWrite {
    pub path: DocumentPath,
    pub data: Document,
    pub increments: BTreeMap<String, i64>,
}

impl DocumentWrite {
    pub fn merge(path: DocumentPath) -> Self {
        Self {
            path,
            data: Document::new(),
            increments: BTreeMap::new(),
        }
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(field.into(), value.into());
        self
    }

    pub fn set_all(mut self, data: Document) -> Self {
        for (field, value) in data {
            self.data.insert(field, value);
        }
        self
    }

    pub fn increment(mut self, field: impl Into<String>, delta: i64) -> Self {
        *self.increments.entry(field.into()).or_insert(0) += delta;
        self
    }

    /// Apply this write to `target` in place.
    pub fn apply_to(&self, target: &mut Document) {
        deep_merge(target, &self.data);

        for (field, delta) in &self.increments {
            let next = match target.get(field) {
                Some(Value::Number(current)) => add_to_number(current, *delta),
                _ => Value::from(*delta),
            };
            target.insert(field.clone(), next);
        }
    }
}

fn deep_merge(target: &mut Document, patch: &Document) {
    for (key, value) in patch {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => deep_merge(existing, nested),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

fn add_to_number(current: &Number, delta: i64) -> Value {
    if let Some(int) = current.as_i64() {
        return Value::from(int.saturating_add(delta));
    }
    if let Some(uint) = current.as_u64() {
        return match i64::try_from(uint) {
            Ok(int) => Value::from(int.saturating_add(delta)),
            Err(_) if delta >= 0 => Value::from(uint.saturating_add(delta.unsigned_abs())),
            Err(_) => Value::from(uint.saturating_sub(delta.unsigned_abs())),
        };
    }

    let float = current.as_f64().unwrap_or_default() + delta as f64;
    Number::from_f64(float).map_or(Value::from(delta), Value::Number)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Document, DocumentPath, DocumentWrite};

    fn doc(value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    fn path() -> DocumentPath {
        DocumentPath::new("users", "alice")
    }

    #[test]
    fn paths_display_as_collection_slash_id() {
        assert_eq!(path().to_string(), "users/alice");
    }

    #[test]
    fn zero_increment_creates_missing_field() {
        let mut target = Document::new();
        DocumentWrite::merge(path())
            .increment("totalXP", 0)
            .apply_to(&mut target);
        assert_eq!(target, doc(json!({ "totalXP": 0 })));
    }

    #[test]
    fn zero_increment_keeps_existing_value() {
        let mut target = doc(json!({ "totalXP": 42 }));
        DocumentWrite::merge(path())
            .increment("totalXP", 0)
            .apply_to(&mut target);
        assert_eq!(target, doc(json!({ "totalXP": 42 })));

        let mut fractional = doc(json!({ "totalXP": 2.5 }));
        DocumentWrite::merge(path())
            .increment("totalXP", 0)
            .apply_to(&mut fractional);
        assert_eq!(fractional, doc(json!({ "totalXP": 2.5 })));
    }

    #[test]
    fn increment_replaces_non_numeric_value() {
        let mut target = doc(json!({ "totalXP": "lots" }));
        DocumentWrite::merge(path())
            .increment("totalXP", 3)
            .apply_to(&mut target);
        assert_eq!(target, doc(json!({ "totalXP": 3 })));
    }

    #[test]
    fn merge_leaves_unspecified_fields_intact() {
        let mut target = doc(json!({ "displayName": "Ada", "streak": 7 }));
        DocumentWrite::merge(path())
            .set("displayName", "User")
            .apply_to(&mut target);
        assert_eq!(target, doc(json!({ "displayName": "User", "streak": 7 })));
    }

    #[test]
    fn nested_objects_merge_key_by_key() {
        let mut target = doc(json!({
            "entries": { "bob": { "totalXP": 10, "badge": "gold" } },
            "season": 3
        }));
        let patch = doc(json!({
            "entries": {
                "alice": { "totalXP": 5 },
                "bob": { "totalXP": 11 }
            }
        }));
        DocumentWrite::merge(path())
            .set_all(patch)
            .apply_to(&mut target);

        assert_eq!(
            target,
            doc(json!({
                "entries": {
                    "alice": { "totalXP": 5 },
                    "bob": { "totalXP": 11, "badge": "gold" }
                },
                "season": 3
            }))
        );
    }

    #[test]
    fn repeated_increments_accumulate() {
        let write = DocumentWrite::merge(path())
            .increment("totalXP", 2)
            .increment("totalXP", 3);
        assert_eq!(write.increments.get("totalXP"), Some(&5));
    }
}
