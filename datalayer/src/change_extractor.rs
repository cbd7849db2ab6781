//! C6: orchestrates the connection manager (C2), query builder (C3),
//! token codec (C4) and row mapper (C5) into one GET request's worth of
//! work — capture the pre-query position, stream rows as entities
//! through a caller-supplied callback, then emit the continuation
//! marker.

use futures_util::StreamExt;

use common::err::{CResult, DatalayerError};
use connection::SqlClient;

use crate::config::{Datalayer, TableMapping};
use crate::connection_manager::ConnectionManager;
use crate::entity::Entity;
use crate::query_builder::{self, DatasetRequest};
use crate::row_mapper;
use crate::token;

/// `{ name, type: [...] }` — one row of the `GET /datasets` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetEndpoint {
    pub name: String,
    pub methods: Vec<&'static str>,
}

/// Union of read (`table_mappings`) and write (`post_mappings`) dataset
/// names: every table mapping contributes `"GET"`, every post mapping
/// contributes `"POST"`, merged by table name.
pub fn list_datasets(datalayer: &Datalayer) -> Vec<DatasetEndpoint> {
    let mut endpoints: Vec<DatasetEndpoint> = datalayer
        .table_mappings
        .iter()
        .map(|t| DatasetEndpoint { name: t.table_name.clone(), methods: vec!["GET"] })
        .collect();
    for post in &datalayer.post_mappings {
        match endpoints.iter_mut().find(|e| e.name == post.table_name) {
            Some(existing) => existing.methods.push("POST"),
            None => endpoints.push(DatasetEndpoint { name: post.table_name.clone(), methods: vec!["POST"] }),
        }
    }
    endpoints
}

pub fn dataset_exists(datalayer: &Datalayer, name: &str) -> bool {
    datalayer.table_mapping(name).is_some()
}

/// Orchestrates one GET request. `emit` is called once per mapped row
/// in driver order, and once more at the end with the continuation
/// marker entity if the table is incremental (`cdc_enabled` or
/// `since_column`).
///
/// Returns `Ok(())` for both a clean run and the two "nothing to do"
/// cases the Go source treats as a quiet no-op rather than an error
/// (unknown dataset, custom query missing its limit placeholder) — the
/// `web` crate is expected to have already turned "unknown dataset"
/// into a 404 before calling in, but `change_set` stays defensive for
/// direct callers. Any other `Err` means the row stream broke partway
/// through and the caller must not close the JSON array.
pub async fn change_set<F, Fut>(
    datalayer: &Datalayer,
    conn_mgr: &ConnectionManager,
    request: &DatasetRequest,
    mut emit: F,
) -> CResult<()>
where
    F: FnMut(Entity) -> Fut,
    Fut: std::future::Future<Output = CResult<()>>,
{
    let table = match datalayer.table_mapping(&request.dataset_name) {
        Some(t) => t,
        None => {
            tracing::warn!("could not find defined dataset: {}", request.dataset_name);
            return Ok(());
        }
    };

    if let Some(cq) = table.custom_query.as_deref() {
        if !cq.is_empty() && !cq.contains("%s") {
            tracing::error!(
                "custom query defined for {} is missing the required %s for limit injection",
                table.table_name
            );
            return Ok(());
        }
    }

    let url = datalayer.connection_url(table)?;
    let client = conn_mgr.ensure_read(&datalayer.digest, &url).await?;

    let schema = datalayer.schema_for_table(table);
    let mut since = fetch_since(&*client, table).await.unwrap_or_default();

    let sql = query_builder::build(table, &schema, request);
    tracing::debug!("executing query for dataset {}: {}", request.dataset_name, sql);
    let mut rows = client.query(&sql).await.map_err(|e| DatalayerError::QueryFailed(e.to_string()))?;

    while let Some(row) = rows.next().await {
        match row {
            Ok(row) => {
                let entity = row_mapper::map_row(&row, table, &datalayer.base_uri, datalayer.time_zone.as_deref())?;
                emit(entity).await?;
            }
            Err(e) if e.is_lsn_past_end_of_log() => {
                tracing::info!("ignoring error and not updating token: {e}");
                since = request.since.clone();
                break;
            }
            Err(e) => return Err(e),
        }
    }

    if table.cdc_enabled || table.since_column.is_some() {
        emit(Entity::continuation(since)).await?;
    }

    Ok(())
}

/// C4's "capture snapshot position" step: queried *before* the main
/// change query runs, so the emitted continuation reflects the server
/// position as of request start, not as of the last row read.
async fn fetch_since(client: &dyn SqlClient, table: &TableMapping) -> CResult<String> {
    if let Some(col) = &table.since_column {
        let value = client
            .query_scalar(&format!("SELECT MAX({col}) FROM {}", table.table_name))
            .await
            .map_err(|e| DatalayerError::QueryFailed(e.to_string()))?;
        let dt = value
            .as_str()
            .and_then(common::time_util::parse_flexible_timestamp)
            .ok_or_else(|| DatalayerError::QueryFailed(format!("since_column query on {} returned no timestamp", table.table_name)))?;
        Ok(token::encode_since_column(&dt))
    } else if table.cdc_enabled {
        let value = client
            .query_scalar("SELECT sys.fn_cdc_get_max_lsn()")
            .await
            .map_err(|e| DatalayerError::QueryFailed(e.to_string()))?;
        let bytes = value
            .as_bytes()
            .ok_or_else(|| DatalayerError::QueryFailed("fn_cdc_get_max_lsn() returned no bytes".into()))?;
        Ok(token::encode_cdc_lsn(bytes))
    } else {
        let value = client
            .query_scalar("SELECT GETDATE()")
            .await
            .map_err(|e| DatalayerError::QueryFailed(e.to_string()))?;
        let dt = value
            .as_str()
            .and_then(common::time_util::parse_flexible_timestamp)
            .ok_or_else(|| DatalayerError::QueryFailed("GETDATE() returned no timestamp".into()))?;
        Ok(token::encode_timestamp(&dt))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{ColumnMapping, VariableGetter};
    use connection::mock::{MockClient, MockPool};
    use connection::{ColumnMeta, Row, SqlValue};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn datalayer_with(table: TableMapping) -> Datalayer {
        Datalayer {
            server: "s".into(),
            port: "1433".into(),
            instance: String::new(),
            database: "db".into(),
            schema: "dbo".into(),
            user: VariableGetter { kind: "env".into(), key: "U".into() },
            password: VariableGetter { kind: "env".into(), key: "P".into() },
            base_uri: "http://data.test.io/test/".into(),
            base_namespace: "http://data.test.io/test/".into(),
            time_zone: None,
            table_mappings: vec![table],
            post_mappings: Vec::new(),
            digest: "d1".into(),
        }
    }

    fn table_with_id_column(cdc_enabled: bool) -> TableMapping {
        let mut columns = HashMap::new();
        columns.insert(
            "Id".to_string(),
            ColumnMapping {
                column_name: "Id".into(),
                property_name: None,
                is_id_column: true,
                is_reference: false,
                reference_template: None,
                ignore_column: false,
            },
        );
        TableMapping {
            table_name: "test".into(),
            namespace: None,
            custom_query: None,
            cdc_enabled,
            since_column: None,
            entity_id_constructor: "foo/%s".into(),
            types: Vec::new(),
            columns,
            connection: None,
            time_zone: None,
        }
    }

    #[tokio::test]
    async fn unknown_dataset_emits_nothing_and_succeeds() {
        let datalayer = datalayer_with(table_with_id_column(false));
        let conn_mgr = ConnectionManager::new(Arc::new(MockPool::new(MockClient::new())));
        let request = DatasetRequest { dataset_name: "missing".into(), since: String::new(), limit: 0 };
        let mut seen = 0;
        change_set(&datalayer, &conn_mgr, &request, |_| {
            seen += 1;
            async { Ok(()) }
        })
        .await
        .unwrap();
        assert_eq!(seen, 0);
    }

    #[tokio::test]
    async fn full_scan_emits_one_entity_and_no_continuation() {
        let datalayer = datalayer_with(table_with_id_column(false));
        let client = MockClient::new();
        let cols: Arc<[ColumnMeta]> = Arc::from(vec![ColumnMeta { name: "Id".into(), database_type_name: "VARCHAR".into() }]);
        client.push_query("FROM [dbo].[test]", vec![Row::new(vec![SqlValue::Str("1".into())], cols)]);
        let conn_mgr = ConnectionManager::new(Arc::new(MockPool::new(client)));

        let request = DatasetRequest { dataset_name: "test".into(), since: String::new(), limit: 0 };
        let mut entities = Vec::new();
        change_set(&datalayer, &conn_mgr, &request, |e| {
            entities.push(e);
            async { Ok(()) }
        })
        .await
        .unwrap();

        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].id, "http://data.test.io/test/foo/1");
    }

    #[tokio::test]
    async fn cdc_table_appends_continuation_marker() {
        let datalayer = datalayer_with(table_with_id_column(true));
        let client = MockClient::new();
        client.push_scalar("fn_cdc_get_max_lsn", SqlValue::Bytes(vec![0u8; 10]));
        let cols: Arc<[ColumnMeta]> = Arc::from(vec![ColumnMeta { name: "Id".into(), database_type_name: "VARCHAR".into() }]);
        client.push_query("cdc.fn_cdc_get_all_changes", vec![Row::new(vec![SqlValue::Str("1".into())], cols)]);
        let conn_mgr = ConnectionManager::new(Arc::new(MockPool::new(client)));

        let since = token::encode_cdc_lsn(&[0u8; 10]);
        let request = DatasetRequest { dataset_name: "test".into(), since, limit: 0 };
        let mut entities = Vec::new();
        change_set(&datalayer, &conn_mgr, &request, |e| {
            entities.push(e);
            async { Ok(()) }
        })
        .await
        .unwrap();

        assert_eq!(entities.len(), 2);
        assert!(entities[1].is_continuation());
        assert!(entities[1].properties.get("token").and_then(|v| v.as_str()).is_some());
    }

    /// §8 property 5 / S2: an LSN-past-end-of-log error mid-stream is
    /// swallowed, the caller's own `since` is reused as the continuation
    /// (not advanced to the freshly-queried max LSN), and no other rows
    /// are emitted.
    #[tokio::test]
    async fn error_313_reuses_callers_since_and_emits_no_rows() {
        let datalayer = datalayer_with(table_with_id_column(true));
        let client = MockClient::new();
        client.push_scalar("fn_cdc_get_max_lsn", SqlValue::Bytes(vec![9u8; 10]));
        client.push_row_error(
            "cdc.fn_cdc_get_all_changes",
            DatalayerError::SqlServerError { number: 313, message: "lsn range exceeded".into() },
        );
        let conn_mgr = ConnectionManager::new(Arc::new(MockPool::new(client)));

        let callers_since = token::encode_cdc_lsn(&[1u8; 10]);
        let request = DatasetRequest { dataset_name: "test".into(), since: callers_since.clone(), limit: 0 };
        let mut entities = Vec::new();
        change_set(&datalayer, &conn_mgr, &request, |e| {
            entities.push(e);
            async { Ok(()) }
        })
        .await
        .unwrap();

        assert_eq!(entities.len(), 1);
        assert!(entities[0].is_continuation());
        assert_eq!(
            entities[0].properties.get("token").and_then(|v| v.as_str()),
            Some(callers_since.as_str())
        );
    }
}
