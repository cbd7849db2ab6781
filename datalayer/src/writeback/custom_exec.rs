use std::collections::HashMap;

use connection::{Param, SqlClient};

use common::err::{CResult, DatalayerError};

use crate::config::{FieldMapping, PostMapping};
use crate::entity::Entity;
use crate::writeback::coerce::{coerce_field, resolve_namespace};

/// Runs a user-supplied parameterized query once per non-deleted
/// entity, then flushes every deleted entity's id as one batched,
/// parameterized delete statement.
pub async fn run(
    client: &dyn SqlClient,
    post: &PostMapping,
    fields: &[FieldMapping],
    entities: Vec<Entity>,
    namespaces: &HashMap<String, String>,
) -> CResult<()> {
    let mut delete_ids = Vec::new();

    for entity in &entities {
        if !entity.id.contains(':') {
            continue;
        }
        if entity.is_deleted {
            delete_ids.push(entity.id.clone());
            continue;
        }

        let mut params = Vec::with_capacity(fields.len());
        for field in fields {
            let raw = entity.properties.get(&field.field_name).cloned();
            let value = raw.map(|v| {
                if field.resolve_namespace {
                    resolve_namespace(v, namespaces)
                } else {
                    v
                }
            });
            if let Some(param) =
                coerce_field(field, value.as_ref(), post.null_empty_column_values, post.time_zone.as_deref())?
            {
                params.push(param);
            }
        }
        client
            .execute(&post.query, &params)
            .await
            .map_err(|e| DatalayerError::WriteFailed(e.to_string()))?;
    }

    if !delete_ids.is_empty() {
        let clauses: Vec<String> = (1..=delete_ids.len())
            .map(|i| format!("DELETE FROM {} WHERE {} = @p{i}", post.table_name, post.id_column))
            .collect();
        let params: Vec<Param> = delete_ids.into_iter().map(Param::Str).collect();
        client
            .execute(&clauses.join("; "), &params)
            .await
            .map_err(|e| DatalayerError::WriteFailed(e.to_string()))?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use connection::mock::MockClient;

    fn post_mapping() -> PostMapping {
        PostMapping {
            dataset_name: "test".into(),
            table_name: "t".into(),
            id_column: "Id".into(),
            query: "INSERT INTO t (Id, Name) VALUES (@p1, @p2)".into(),
            field_mappings: vec![
                FieldMapping { field_name: "Id".into(), sort_order: 1, resolve_namespace: false, data_type: "VARCHAR".into() },
                FieldMapping { field_name: "Name".into(), sort_order: 2, resolve_namespace: false, data_type: "VARCHAR".into() },
            ],
            null_empty_column_values: false,
            workers: 1,
            batch_size: 10,
            time_zone: None,
            connection: None,
        }
    }

    #[tokio::test]
    async fn skips_ids_without_colon_and_runs_custom_query_for_the_rest() {
        let client = MockClient::new();
        let post = post_mapping();
        let fields = post.field_mappings.clone();

        let mut skip = crate::entity::Entity::new("no-colon-id");
        skip.set_property("Id", crate::entity::PropValue::Str("no-colon-id".into()));
        let mut keep = crate::entity::Entity::new("a:1");
        keep.set_property("Id", crate::entity::PropValue::Str("a:1".into()));
        keep.set_property("Name", crate::entity::PropValue::Str("Alpha".into()));

        run(&client, &post, &fields, vec![skip, keep], &HashMap::new()).await.unwrap();
        assert_eq!(client.executed_statements().len(), 1);
    }

    #[tokio::test]
    async fn batches_deletes_into_one_statement() {
        let client = MockClient::new();
        let post = post_mapping();
        let fields = post.field_mappings.clone();

        let mut a = crate::entity::Entity::new("a:1");
        a.is_deleted = true;
        let mut b = crate::entity::Entity::new("a:2");
        b.is_deleted = true;

        run(&client, &post, &fields, vec![a, b], &HashMap::new()).await.unwrap();
        let executed = client.executed_statements();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].1.len(), 2);
    }
}
