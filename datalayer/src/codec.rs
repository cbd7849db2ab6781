//! C8: the JSON shapes that frame a dataset stream — `@context`,
//! mapped entities, and `@continuation` — independent of how the `web`
//! crate chunks and flushes them onto an HTTP response body.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::config::{Datalayer, TableMapping};
use crate::entity::{Entity, RefValue};

const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

/// The `{ "id": "@context", "namespaces": {...} }` element every GET
/// stream opens with.
#[derive(Debug, Serialize)]
pub struct ContextWire {
    pub id: &'static str,
    pub namespaces: BTreeMap<String, String>,
}

/// Builds the context for `table`: `ns0` resolves to the table's
/// namespace alias (falling back to its own table name) under the
/// layer's base namespace; `rdf` is the fixed RDF vocabulary.
pub fn context_for(datalayer: &Datalayer, table: &TableMapping) -> ContextWire {
    let namespace = table.namespace.as_deref().unwrap_or(&table.table_name);
    let mut namespaces = BTreeMap::new();
    namespaces.insert("ns0".to_string(), format!("{}{}/", datalayer.base_namespace, namespace));
    namespaces.insert("rdf".to_string(), RDF_NS.to_string());
    ContextWire { id: "@context", namespaces }
}

/// The `{ "id": "...", "deleted": bool, "props": {...}, "refs": {...} }`
/// shape a mapped (non-continuation) entity is serialized as.
#[derive(Debug, Serialize)]
pub struct EntityWire<'a> {
    pub id: &'a str,
    pub deleted: bool,
    pub props: BTreeMap<&'a str, JsonValue>,
    pub refs: BTreeMap<&'a str, JsonValue>,
}

/// The flattened `{ "id": "@continuation", "token": "..." }` shape the
/// continuation marker entity collapses to on the wire — it carries no
/// `props`/`refs` envelope, matching the HTTP handler's special-casing
/// of `entity.id == "@continuation"`.
#[derive(Debug, Serialize)]
pub struct ContinuationWire<'a> {
    pub id: &'static str,
    pub token: &'a str,
}

fn ref_to_json(v: &RefValue) -> JsonValue {
    match v {
        RefValue::One(s) => JsonValue::String(s.clone()),
        RefValue::Many(items) => JsonValue::Array(items.iter().map(|s| JsonValue::String(s.clone())).collect()),
    }
}

/// One wire-framed element of a GET stream: either the flattened
/// continuation shape or the full entity shape, matching how the Go
/// source's HTTP handler distinguishes the two before encoding.
pub enum StreamElement<'a> {
    Continuation(ContinuationWire<'a>),
    Entity(EntityWire<'a>),
}

impl<'a> StreamElement<'a> {
    pub fn for_entity(entity: &'a Entity) -> Self {
        if entity.is_continuation() {
            let token = entity
                .properties
                .get("token")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            StreamElement::Continuation(ContinuationWire { id: "@continuation", token })
        } else {
            StreamElement::Entity(EntityWire {
                id: &entity.id,
                deleted: entity.is_deleted,
                props: entity.properties.iter().map(|(k, v)| (k.as_str(), v.to_json())).collect(),
                refs: entity.references.iter().map(|(k, v)| (k.as_str(), ref_to_json(v))).collect(),
            })
        }
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        match self {
            StreamElement::Continuation(c) => serde_json::to_string(c),
            StreamElement::Entity(e) => serde_json::to_string(e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entity::PropValue;
    use std::collections::HashMap;

    fn bare_datalayer() -> Datalayer {
        Datalayer {
            server: "s".into(),
            port: "1433".into(),
            instance: String::new(),
            database: "db".into(),
            schema: "dbo".into(),
            user: crate::config::VariableGetter { kind: "env".into(), key: "U".into() },
            password: crate::config::VariableGetter { kind: "env".into(), key: "P".into() },
            base_uri: "http://data.test.io/test/".into(),
            base_namespace: "http://data.test.io/test/".into(),
            time_zone: None,
            table_mappings: Vec::new(),
            post_mappings: Vec::new(),
            digest: "d".into(),
        }
    }

    fn bare_table() -> TableMapping {
        TableMapping {
            table_name: "test".into(),
            namespace: None,
            custom_query: None,
            cdc_enabled: false,
            since_column: None,
            entity_id_constructor: "foo/%s".into(),
            types: Vec::new(),
            columns: HashMap::new(),
            connection: None,
            time_zone: None,
        }
    }

    #[test]
    fn context_uses_table_name_when_namespace_unset() {
        let ctx = context_for(&bare_datalayer(), &bare_table());
        assert_eq!(ctx.namespaces.get("ns0").unwrap(), "http://data.test.io/test/test/");
        assert_eq!(ctx.namespaces.get("rdf").unwrap(), RDF_NS);
    }

    #[test]
    fn continuation_entity_flattens_to_id_and_token() {
        let entity = Entity::continuation("tok123");
        match StreamElement::for_entity(&entity) {
            StreamElement::Continuation(c) => {
                assert_eq!(c.id, "@continuation");
                assert_eq!(c.token, "tok123");
            }
            StreamElement::Entity(_) => panic!("expected continuation"),
        }
    }

    #[test]
    fn regular_entity_keeps_props_and_refs() {
        let mut entity = Entity::new("http://data.test.io/test/foo/1");
        entity.set_property("ns0:Name", PropValue::Str("test".into()));
        entity.set_reference("rdf:type", "http://example.org/Foo");
        match StreamElement::for_entity(&entity) {
            StreamElement::Entity(e) => {
                assert_eq!(e.id, "http://data.test.io/test/foo/1");
                assert!(!e.deleted);
                assert_eq!(e.props.get("ns0:Name"), Some(&JsonValue::String("test".into())));
                assert!(e.refs.contains_key("rdf:type"));
            }
            StreamElement::Continuation(_) => panic!("expected entity"),
        }
    }
}
