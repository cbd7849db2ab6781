use std::collections::HashMap;

use common::err::{CResult, DatalayerError};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::fmt_util::has_single_placeholder;

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Indirection for credentials: today the only supported kind reads the
/// process environment by `key`. An unrecognized `type` is a load-time
/// error rather than a silent fallback.
#[derive(Debug, Clone, Deserialize)]
pub struct VariableGetter {
    #[serde(rename = "type")]
    pub kind: String,
    pub key: String,
}

impl VariableGetter {
    pub fn resolve(&self) -> CResult<String> {
        match self.kind.as_str() {
            "env" => Ok(std::env::var(&self.key).unwrap_or_default()),
            other => Err(DatalayerError::InvalidConfig(format!(
                "unsupported variable getter type: {other}"
            ))),
        }
    }
}

/// Per-table/per-posting connection overrides. Any subset may be set;
/// unset fields fall back to the layer default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionOverride {
    pub server: Option<String>,
    pub port: Option<String>,
    pub instance: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub user: Option<VariableGetter>,
    pub password: Option<VariableGetter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnMapping {
    pub column_name: String,
    #[serde(default)]
    pub property_name: Option<String>,
    #[serde(default)]
    pub is_id_column: bool,
    #[serde(default)]
    pub is_reference: bool,
    #[serde(default)]
    pub reference_template: Option<String>,
    #[serde(default)]
    pub ignore_column: bool,
}

impl ColumnMapping {
    /// The property name an entity value ends up under: the explicit
    /// override, or `ns0:<source column name>`.
    pub fn effective_property_name(&self) -> String {
        match &self.property_name {
            Some(p) if !p.is_empty() => p.clone(),
            _ => format!("ns0:{}", self.column_name),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TableMappingRaw {
    table_name: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    custom_query: Option<String>,
    #[serde(default)]
    cdc_enabled: bool,
    #[serde(default)]
    since_column: Option<String>,
    entity_id_constructor: String,
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    column_mappings: Vec<ColumnMapping>,
    #[serde(default)]
    connection: Option<ConnectionOverride>,
    #[serde(default)]
    time_zone: Option<String>,
}

/// A dataset's read-side mapping: table identity, optional custom query
/// strategy, entity-id/reference templating, and per-column rules.
#[derive(Debug, Clone)]
pub struct TableMapping {
    pub table_name: String,
    pub namespace: Option<String>,
    pub custom_query: Option<String>,
    pub cdc_enabled: bool,
    pub since_column: Option<String>,
    pub entity_id_constructor: String,
    pub types: Vec<String>,
    pub columns: HashMap<String, ColumnMapping>,
    pub connection: Option<ConnectionOverride>,
    pub time_zone: Option<String>,
}

impl TableMapping {
    pub fn id_column(&self) -> Option<&ColumnMapping> {
        self.columns.values().find(|c| c.is_id_column)
    }
}

impl TryFrom<TableMappingRaw> for TableMapping {
    type Error = DatalayerError;

    fn try_from(raw: TableMappingRaw) -> Result<Self, Self::Error> {
        if !has_single_placeholder(&raw.entity_id_constructor) {
            return Err(DatalayerError::InvalidConfig(format!(
                "table {}: entity_id_constructor must contain exactly one %s placeholder",
                raw.table_name
            )));
        }
        if let Some(cq) = raw.custom_query.as_deref().filter(|q| !q.is_empty()) {
            if !cq.contains("%s") && !cq.contains("{{ since }}") {
                return Err(DatalayerError::InvalidConfig(format!(
                    "table {}: custom_query must contain a %s limit placeholder or a {{{{ since }}}} token",
                    raw.table_name
                )));
            }
        }
        let id_columns = raw.column_mappings.iter().filter(|c| c.is_id_column).count();
        if id_columns > 1 {
            return Err(DatalayerError::InvalidConfig(format!(
                "table {}: at most one column may have is_id_column=true",
                raw.table_name
            )));
        }
        for c in &raw.column_mappings {
            if c.is_reference {
                match &c.reference_template {
                    Some(t) if has_single_placeholder(t) => {}
                    _ => {
                        return Err(DatalayerError::InvalidConfig(format!(
                            "table {}: column {} is_reference requires a reference_template with exactly one %s placeholder",
                            raw.table_name, c.column_name
                        )))
                    }
                }
            }
        }
        let columns = raw
            .column_mappings
            .into_iter()
            .map(|c| (c.column_name.clone(), c))
            .collect();
        Ok(TableMapping {
            table_name: raw.table_name,
            namespace: raw.namespace,
            custom_query: raw.custom_query,
            cdc_enabled: raw.cdc_enabled,
            since_column: raw.since_column,
            entity_id_constructor: raw.entity_id_constructor,
            types: raw.types,
            columns,
            connection: raw.connection,
            time_zone: raw.time_zone,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldMapping {
    pub field_name: String,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub resolve_namespace: bool,
    pub data_type: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PostMappingRaw {
    dataset_name: String,
    table_name: String,
    id_column: String,
    query: String,
    #[serde(default)]
    field_mappings: Vec<FieldMapping>,
    #[serde(default)]
    null_empty_column_values: bool,
    #[serde(default)]
    workers: Option<usize>,
    #[serde(default)]
    batch_size: Option<usize>,
    #[serde(default)]
    time_zone: Option<String>,
    #[serde(default)]
    connection: Option<ConnectionOverride>,
}

pub const DEFAULT_WORKERS: usize = 20;
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// A dataset's write-side mapping: target table, dispatch query
/// (`upsertBulk` or a user-supplied parameterized statement), and the
/// field mappings driving value coercion.
#[derive(Debug, Clone)]
pub struct PostMapping {
    pub dataset_name: String,
    pub table_name: String,
    pub id_column: String,
    pub query: String,
    pub field_mappings: Vec<FieldMapping>,
    pub null_empty_column_values: bool,
    pub workers: usize,
    pub batch_size: usize,
    pub time_zone: Option<String>,
    pub connection: Option<ConnectionOverride>,
}

impl PostMapping {
    pub fn is_bulk_upsert(&self) -> bool {
        self.query == "upsertBulk"
    }

    /// Field mappings in dispatch order: ascending `sort_order`, unless
    /// at least two fields leave it unset (0), in which case input
    /// order is kept and a warning is the caller's responsibility.
    pub fn sorted_field_mappings(&self) -> Vec<&FieldMapping> {
        let unset = self.field_mappings.iter().filter(|f| f.sort_order == 0).count();
        let mut fields: Vec<&FieldMapping> = self.field_mappings.iter().collect();
        if unset < 2 {
            fields.sort_by_key(|f| f.sort_order);
        }
        fields
    }
}

impl From<PostMappingRaw> for PostMapping {
    fn from(raw: PostMappingRaw) -> Self {
        PostMapping {
            dataset_name: raw.dataset_name,
            table_name: raw.table_name,
            id_column: raw.id_column,
            query: raw.query,
            field_mappings: raw.field_mappings,
            null_empty_column_values: raw.null_empty_column_values,
            workers: raw.workers.filter(|w| *w > 0).unwrap_or(DEFAULT_WORKERS),
            batch_size: raw.batch_size.filter(|b| *b > 0).unwrap_or(DEFAULT_BATCH_SIZE),
            time_zone: raw.time_zone,
            connection: raw.connection,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DatalayerRaw {
    server: String,
    #[serde(default)]
    port: String,
    #[serde(default)]
    instance: String,
    database: String,
    schema: String,
    user: VariableGetter,
    password: VariableGetter,
    base_uri: String,
    base_namespace: String,
    #[serde(default)]
    time_zone: Option<String>,
    #[serde(default)]
    table_mappings: Vec<TableMappingRaw>,
    #[serde(default)]
    post_mappings: Vec<PostMappingRaw>,
}

/// Root configuration document: default connection parameters plus the
/// read (`table_mappings`) and write (`post_mappings`) dataset lists.
#[derive(Debug, Clone)]
pub struct Datalayer {
    pub server: String,
    pub port: String,
    pub instance: String,
    pub database: String,
    pub schema: String,
    pub user: VariableGetter,
    pub password: VariableGetter,
    pub base_uri: String,
    pub base_namespace: String,
    pub time_zone: Option<String>,
    pub table_mappings: Vec<TableMapping>,
    pub post_mappings: Vec<PostMapping>,
    /// Hex SHA-256 of the raw document bytes this was parsed from. Used
    /// by the connection manager to detect when a pooled connection was
    /// opened under a configuration that has since been superseded.
    pub digest: String,
}

impl Datalayer {
    pub fn from_json(bytes: &[u8]) -> CResult<Self> {
        let raw: DatalayerRaw = serde_json::from_slice(bytes)?;
        let table_mappings = raw
            .table_mappings
            .into_iter()
            .map(TableMapping::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let post_mappings = raw.post_mappings.into_iter().map(PostMapping::from).collect();
        Ok(Datalayer {
            server: raw.server,
            port: if raw.port.is_empty() { "1433".to_string() } else { raw.port },
            instance: raw.instance,
            database: raw.database,
            schema: raw.schema,
            user: raw.user,
            password: raw.password,
            base_uri: raw.base_uri,
            base_namespace: raw.base_namespace,
            time_zone: raw.time_zone,
            table_mappings,
            post_mappings,
            digest: digest_bytes(bytes),
        })
    }

    /// Read-side lookup: dataset name equals table name.
    pub fn table_mapping(&self, dataset: &str) -> Option<&TableMapping> {
        self.table_mappings.iter().find(|t| t.table_name == dataset)
    }

    /// Write-side lookup: dataset name first, table name fallback.
    pub fn post_mapping(&self, dataset: &str) -> Option<&PostMapping> {
        self.post_mappings
            .iter()
            .find(|p| p.dataset_name == dataset)
            .or_else(|| self.post_mappings.iter().find(|p| p.table_name == dataset))
    }

    pub fn schema_for_table(&self, table: &TableMapping) -> String {
        table
            .connection
            .as_ref()
            .and_then(|c| c.schema.clone())
            .unwrap_or_else(|| self.schema.clone())
    }

    fn resolved(&self, over: &Option<ConnectionOverride>) -> CResult<ResolvedConnection> {
        let o = over.as_ref();
        let user = match o.and_then(|c| c.user.as_ref()) {
            Some(v) => v.resolve()?,
            None => self.user.resolve()?,
        };
        let password = match o.and_then(|c| c.password.as_ref()) {
            Some(v) => v.resolve()?,
            None => self.password.resolve()?,
        };
        Ok(ResolvedConnection {
            server: o.and_then(|c| c.server.clone()).unwrap_or_else(|| self.server.clone()),
            port: o.and_then(|c| c.port.clone()).unwrap_or_else(|| self.port.clone()),
            instance: o.and_then(|c| c.instance.clone()).unwrap_or_else(|| self.instance.clone()),
            database: o.and_then(|c| c.database.clone()).unwrap_or_else(|| self.database.clone()),
            user,
            password,
        })
    }

    /// Composes the read-side connection URL for `table`, honoring any
    /// per-table override.
    pub fn connection_url(&self, table: &TableMapping) -> CResult<String> {
        self.resolved(&table.connection).map(|r| r.to_url())
    }

    /// Composes the write-side connection URL for `post`, honoring any
    /// per-posting override.
    pub fn post_connection_url(&self, post: &PostMapping) -> CResult<String> {
        self.resolved(&post.connection).map(|r| r.to_url())
    }
}

struct ResolvedConnection {
    server: String,
    port: String,
    instance: String,
    database: String,
    user: String,
    password: String,
}

impl ResolvedConnection {
    /// `sqlserver://<user>:<pass>@<host>[:<port>][/<instance>]?database=<db>&packet size=32767`,
    /// selecting the instance form when `instance` is set.
    fn to_url(&self) -> String {
        let host_part = if !self.instance.is_empty() {
            format!("{}/{}", self.server, self.instance)
        } else {
            format!("{}:{}", self.server, self.port)
        };
        format!(
            "sqlserver://{}:{}@{}?database={}&packet size=32767",
            self.user, self.password, host_part, self.database
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "server": "db.local",
            "port": "1433",
            "instance": "",
            "database": "demo",
            "schema": "dbo",
            "user": { "type": "env", "key": "MSSQL_DB_USER" },
            "password": { "type": "env", "key": "MSSQL_DB_PASSWORD" },
            "base_uri": "http://data.test.io",
            "base_namespace": "test",
            "table_mappings": [
                {
                    "table_name": "test",
                    "cdc_enabled": true,
                    "entity_id_constructor": "foo/%s",
                    "column_mappings": [
                        { "column_name": "Id", "is_id_column": true },
                        { "column_name": "Name" }
                    ]
                }
            ],
            "post_mappings": [
                {
                    "dataset_name": "test",
                    "table_name": "test",
                    "id_column": "Id",
                    "query": "upsertBulk",
                    "field_mappings": [
                        { "field_name": "Id", "sort_order": 1, "data_type": "VARCHAR" },
                        { "field_name": "Name", "sort_order": 2, "data_type": "VARCHAR" }
                    ]
                }
            ]
        }"#
    }

    #[test]
    fn parses_table_and_post_mappings() {
        let cfg = Datalayer::from_json(sample_json().as_bytes()).unwrap();
        let table = cfg.table_mapping("test").unwrap();
        assert!(table.cdc_enabled);
        assert_eq!(table.id_column().unwrap().column_name, "Id");

        let post = cfg.post_mapping("test").unwrap();
        assert!(post.is_bulk_upsert());
        assert_eq!(post.workers, DEFAULT_WORKERS);
        assert_eq!(post.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn rejects_bad_entity_id_constructor() {
        let bad = sample_json().replace("\"foo/%s\"", "\"foo/%s/%s\"");
        let err = Datalayer::from_json(bad.as_bytes()).unwrap_err();
        assert!(matches!(err, DatalayerError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_custom_query_without_placeholder_or_since_token() {
        let bad = sample_json().replace(
            r#""entity_id_constructor": "foo/%s","#,
            r#""entity_id_constructor": "foo/%s", "custom_query": "SELECT * FROM test","#,
        );
        let err = Datalayer::from_json(bad.as_bytes()).unwrap_err();
        assert!(matches!(err, DatalayerError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_two_id_columns() {
        let bad = sample_json().replace(
            r#"{ "column_name": "Name" }"#,
            r#"{ "column_name": "Name", "is_id_column": true }"#,
        );
        let err = Datalayer::from_json(bad.as_bytes()).unwrap_err();
        assert!(matches!(err, DatalayerError::InvalidConfig(_)));
    }

    #[test]
    fn builds_host_port_connection_url() {
        std::env::set_var("MSSQL_DB_USER", "sa");
        std::env::set_var("MSSQL_DB_PASSWORD", "pw");
        let cfg = Datalayer::from_json(sample_json().as_bytes()).unwrap();
        let table = cfg.table_mapping("test").unwrap();
        let url = cfg.connection_url(table).unwrap();
        assert_eq!(url, "sqlserver://sa:pw@db.local:1433?database=demo&packet size=32767");
    }

    #[test]
    fn sorts_field_mappings_by_sort_order() {
        let cfg = Datalayer::from_json(sample_json().as_bytes()).unwrap();
        let post = cfg.post_mapping("test").unwrap();
        let sorted = post.sorted_field_mappings();
        assert_eq!(sorted[0].field_name, "Id");
        assert_eq!(sorted[1].field_name, "Name");
    }
}
