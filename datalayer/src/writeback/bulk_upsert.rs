use std::collections::HashMap;
use std::sync::Arc;

use connection::{Param, SqlClient};
use tokio::task::JoinSet;

use common::err::{CResult, DatalayerError};

use crate::config::{FieldMapping, PostMapping};
use crate::entity::Entity;
use crate::writeback::coerce::{coerce_field, resolve_namespace};

/// Partitions `entities` into `post.workers` roughly-equal chunks (or a
/// single chunk if there are fewer entities than workers) and runs each
/// chunk through [`run_partition`] concurrently, each owning its own
/// transaction. The first partition failure is returned to the caller;
/// other partitions still run to completion independently, since each
/// holds its own transaction and cannot be rolled back by a sibling's
/// failure.
pub async fn run(
    client: Arc<dyn SqlClient>,
    post: &PostMapping,
    fields: &[FieldMapping],
    entities: Vec<Entity>,
    namespaces: &HashMap<String, String>,
) -> CResult<()> {
    let chunks = partition(entities, post.workers);
    let mut set = JoinSet::new();
    for chunk in chunks {
        let client = client.clone();
        let post = post.clone();
        let fields = fields.to_vec();
        let namespaces = namespaces.clone();
        set.spawn(async move { run_partition(client, &post, &fields, chunk, &namespaces).await });
    }

    let mut first_err = None;
    while let Some(joined) = set.join_next().await {
        let result = match joined {
            Ok(r) => r,
            Err(join_err) => Err(DatalayerError::WriteFailed(join_err.to_string())),
        };
        if let Err(e) = result {
            if first_err.is_none() {
                first_err = Some(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn partition(entities: Vec<Entity>, workers: usize) -> Vec<Vec<Entity>> {
    if workers <= 1 || entities.len() < workers {
        return vec![entities];
    }
    let mut chunks: Vec<Vec<Entity>> = (0..workers).map(|_| Vec::new()).collect();
    for (i, entity) in entities.into_iter().enumerate() {
        chunks[i % workers].push(entity);
    }
    chunks.retain(|c| !c.is_empty());
    chunks
}

/// Runs one partition's worth of entities inside a single transaction:
/// for every entity, delete-by-id then (if not a tombstone) insert the
/// coerced field values. Any execution error rolls the whole partition
/// back; nothing it already inserted survives.
async fn run_partition(
    client: Arc<dyn SqlClient>,
    post: &PostMapping,
    fields: &[FieldMapping],
    entities: Vec<Entity>,
    namespaces: &HashMap<String, String>,
) -> CResult<()> {
    let mut tx = client.begin().await?;
    for entity in &entities {
        let delete_sql = format!("DELETE FROM {} WHERE {} = @p1", post.table_name, post.id_column);
        if let Err(e) = tx.execute(&delete_sql, &[Param::Str(entity.id.clone())]).await {
            let _ = tx.rollback().await;
            return Err(DatalayerError::WriteFailed(e.to_string()));
        }

        if entity.is_deleted {
            continue;
        }

        let mut columns = Vec::with_capacity(fields.len());
        let mut params = Vec::with_capacity(fields.len());
        for field in fields {
            let raw = entity.properties.get(&field.field_name);
            let value = raw.cloned().map(|v| {
                if field.resolve_namespace {
                    resolve_namespace(v, namespaces)
                } else {
                    v
                }
            });
            match coerce_field(field, value.as_ref(), post.null_empty_column_values, post.time_zone.as_deref()) {
                Ok(Some(param)) => {
                    columns.push(field.field_name.clone());
                    params.push(param);
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = tx.rollback().await;
                    return Err(e);
                }
            }
        }

        let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("@p{i}")).collect();
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            post.table_name,
            columns.join(", "),
            placeholders.join(", ")
        );
        if let Err(e) = tx.execute(&insert_sql, &params).await {
            let _ = tx.rollback().await;
            return Err(DatalayerError::WriteFailed(e.to_string()));
        }
    }
    tx.commit().await
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::DEFAULT_WORKERS;
    use connection::mock::{MockClient, MockPool};
    use connection::SqlPool;

    fn post_mapping_bulk(workers: usize) -> PostMapping {
        PostMapping {
            dataset_name: "test".into(),
            table_name: "t".into(),
            id_column: "Id".into(),
            query: "upsertBulk".into(),
            field_mappings: vec![
                FieldMapping { field_name: "Id".into(), sort_order: 1, resolve_namespace: false, data_type: "VARCHAR".into() },
                FieldMapping { field_name: "Name".into(), sort_order: 2, resolve_namespace: false, data_type: "VARCHAR".into() },
            ],
            null_empty_column_values: false,
            workers,
            batch_size: DEFAULT_WORKERS,
            time_zone: None,
            connection: None,
        }
    }

    #[tokio::test]
    async fn single_worker_deletes_then_inserts_in_order_and_deletes_last_for_tombstone() {
        let mock = MockClient::new();
        let pool = MockPool::new(mock.clone());
        let client = pool.open("unused").await.unwrap().into();
        let post = post_mapping_bulk(1);
        let fields = post.field_mappings.clone();

        let mut a = Entity::new("a:1");
        a.set_property("Id", crate::entity::PropValue::Str("a:1".into()));
        a.set_property("Name", crate::entity::PropValue::Str("Alpha".into()));
        let mut b = Entity::new("a:2");
        b.set_property("Id", crate::entity::PropValue::Str("a:2".into()));
        b.set_property("Name", crate::entity::PropValue::Str("Beta".into()));
        let mut c = Entity::new("a:3");
        c.is_deleted = true;

        run(client, &post, &fields, vec![a, b, c], &HashMap::new()).await.unwrap();

        let executed = mock.executed_statements();
        assert_eq!(executed.len(), 5);
        assert!(executed[0].0.starts_with("DELETE FROM t"));
        assert!(executed[1].0.starts_with("INSERT INTO t"));
        assert!(executed[2].0.starts_with("DELETE FROM t"));
        assert!(executed[3].0.starts_with("INSERT INTO t"));
        assert!(executed[4].0.starts_with("DELETE FROM t"));
    }

    #[test]
    fn partitions_into_roughly_equal_chunks() {
        let entities: Vec<Entity> = (0..10).map(|i| Entity::new(format!("a:{i}"))).collect();
        let chunks = partition(entities, 3);
        assert_eq!(chunks.iter().map(Vec::len).sum::<usize>(), 10);
        assert!(chunks.len() <= 3);
    }

    #[test]
    fn fewer_entities_than_workers_runs_single_chunk() {
        let entities: Vec<Entity> = (0..2).map(|i| Entity::new(format!("a:{i}"))).collect();
        let chunks = partition(entities, 20);
        assert_eq!(chunks.len(), 1);
    }
}
