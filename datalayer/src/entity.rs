use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use common::err::{CResult, DatalayerError};

/// One posted or emitted property value. Decoded once into this sum on
/// the way in, re-dispatched per target column type on the way out
/// (mirrors `connection::SqlValue` on the read side).
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropValue::Null)
    }

    pub fn from_json(v: &JsonValue) -> Self {
        match v {
            JsonValue::Null => PropValue::Null,
            JsonValue::Bool(b) => PropValue::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    PropValue::Int(i)
                } else {
                    PropValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => PropValue::Str(s.clone()),
            other => PropValue::Str(other.to_string()),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            PropValue::Null => JsonValue::Null,
            PropValue::Bool(b) => JsonValue::Bool(*b),
            PropValue::Int(i) => JsonValue::from(*i),
            PropValue::Float(f) => {
                serde_json::Number::from_f64(*f).map(JsonValue::Number).unwrap_or(JsonValue::Null)
            }
            PropValue::Str(s) => JsonValue::String(s.clone()),
        }
    }
}

/// One or many URI references under a property name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RefValue {
    One(String),
    Many(Vec<String>),
}

/// A mapped row or a posted record: an id-keyed bag of properties and
/// references. `is_deleted` marks a CDC delete or a posted tombstone.
#[derive(Debug, Clone, Default)]
pub struct Entity {
    pub id: String,
    pub is_deleted: bool,
    pub properties: BTreeMap<String, PropValue>,
    pub references: BTreeMap<String, RefValue>,
}

impl Entity {
    pub fn new(id: impl Into<String>) -> Self {
        Entity {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: PropValue) {
        self.properties.insert(name.into(), value);
    }

    pub fn set_reference(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.references.insert(name.into(), RefValue::One(value.into()));
    }

    pub fn continuation(token: impl Into<String>) -> Self {
        let mut e = Entity::new("@continuation");
        e.set_property("token", PropValue::Str(token.into()));
        e
    }

    pub fn is_continuation(&self) -> bool {
        self.id == "@continuation"
    }

    /// Decodes one posted wire entity: `{ "id": "...", "deleted": bool,
    /// "props": {...}, "refs": {...} }`. `deleted`/`props`/`refs` are
    /// all optional on the wire; a missing or non-string `id` is a
    /// `BadRequest` (the POST body failed to parse into a usable
    /// entity).
    pub fn from_wire(value: &JsonValue) -> CResult<Entity> {
        let obj = value
            .as_object()
            .ok_or_else(|| DatalayerError::BadRequest("entity is not a JSON object".into()))?;
        let id = obj
            .get("id")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| DatalayerError::BadRequest("entity is missing a string id".into()))?
            .to_string();

        let mut entity = Entity::new(id);
        entity.is_deleted = obj.get("deleted").and_then(JsonValue::as_bool).unwrap_or(false);

        if let Some(props) = obj.get("props").and_then(JsonValue::as_object) {
            for (k, v) in props {
                entity.set_property(k.clone(), PropValue::from_json(v));
            }
        }
        if let Some(refs) = obj.get("refs").and_then(JsonValue::as_object) {
            for (k, v) in refs {
                let rv = match v {
                    JsonValue::Array(items) => {
                        RefValue::Many(items.iter().filter_map(JsonValue::as_str).map(str::to_string).collect())
                    }
                    JsonValue::String(s) => RefValue::One(s.clone()),
                    _ => continue,
                };
                entity.references.insert(k.clone(), rv);
            }
        }
        Ok(entity)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_id_is_invalid() {
        let e = Entity::new("");
        assert!(!e.is_valid());
    }

    #[test]
    fn continuation_carries_token() {
        let e = Entity::continuation("abc");
        assert_eq!(e.id, "@continuation");
        assert_eq!(e.properties.get("token"), Some(&PropValue::Str("abc".into())));
    }

    #[test]
    fn from_wire_parses_id_props_and_refs() {
        let v = serde_json::json!({
            "id": "a:1",
            "deleted": true,
            "props": { "Name": "Alpha", "Count": 3 },
            "refs": { "ns0:parent": "a:2", "ns0:children": ["a:3", "a:4"] }
        });
        let e = Entity::from_wire(&v).unwrap();
        assert_eq!(e.id, "a:1");
        assert!(e.is_deleted);
        assert_eq!(e.properties.get("Name"), Some(&PropValue::Str("Alpha".into())));
        assert_eq!(e.properties.get("Count"), Some(&PropValue::Int(3)));
        assert_eq!(e.references.get("ns0:parent"), Some(&RefValue::One("a:2".into())));
        assert_eq!(
            e.references.get("ns0:children"),
            Some(&RefValue::Many(vec!["a:3".into(), "a:4".into()]))
        );
    }

    #[test]
    fn from_wire_rejects_missing_id() {
        let v = serde_json::json!({ "props": {} });
        let err = Entity::from_wire(&v).unwrap_err();
        assert!(matches!(err, DatalayerError::BadRequest(_)));
    }
}
