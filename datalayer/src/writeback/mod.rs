pub mod bulk_upsert;
pub mod coerce;
pub mod custom_exec;

use std::collections::HashMap;

use common::err::{CResult, DatalayerError};

use crate::config::Datalayer;
use crate::connection_manager::ConnectionManager;
use crate::entity::Entity;

/// Writes one posted batch against `dataset`'s post mapping: resolves
/// the write connection, sorts field mappings, and dispatches to the
/// bulk upsert worker pool or a user-supplied parameterized statement
/// depending on whether `query == "upsertBulk"`.
pub async fn post_entities(
    datalayer: &Datalayer,
    conn_mgr: &ConnectionManager,
    dataset: &str,
    entities: Vec<Entity>,
    namespaces: &HashMap<String, String>,
) -> CResult<()> {
    let post = datalayer
        .post_mapping(dataset)
        .ok_or_else(|| DatalayerError::UnknownDataset(dataset.to_string()))?;

    if post.query.is_empty() {
        return Err(DatalayerError::BadRequest(format!(
            "dataset {dataset} has no write query configured"
        )));
    }
    if post.field_mappings.is_empty() {
        return Err(DatalayerError::BadRequest(format!(
            "dataset {dataset} has no field mappings configured"
        )));
    }

    let url = datalayer.post_connection_url(post)?;
    let client = conn_mgr.ensure_write(&datalayer.digest, &url).await?;
    let fields: Vec<_> = post.sorted_field_mappings().into_iter().cloned().collect();

    if post.is_bulk_upsert() {
        bulk_upsert::run(client, post, &fields, entities, namespaces).await
    } else {
        custom_exec::run(&*client, post, &fields, entities, namespaces).await
    }
}
