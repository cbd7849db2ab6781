use std::collections::HashMap;
use std::sync::Arc;

use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use common::err::DatalayerError;
use datalayer::change_extractor;
use datalayer::codec::{context_for, StreamElement};
use datalayer::entity::Entity;
use datalayer::{writeback, DatasetRequest};

use crate::state::AppState;
use crate::web_error::WebError;

#[derive(Debug, Deserialize)]
pub struct ChangesQuery {
    pub since: Option<String>,
    pub limit: Option<i64>,
}

#[get("/datasets")]
pub async fn list_datasets(state: web::Data<Arc<AppState>>) -> HttpResponse {
    let datalayer = state.current_datalayer().await;
    let endpoints: Vec<JsonValue> = change_extractor::list_datasets(&datalayer)
        .into_iter()
        .map(|e| serde_json::json!({ "name": e.name, "type": e.methods }))
        .collect();
    HttpResponse::Ok().json(endpoints)
}

#[get("/datasets/{dataset}/changes")]
pub async fn get_changes(
    state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    query: web::Query<ChangesQuery>,
) -> Result<HttpResponse, WebError> {
    stream_dataset(state, path.into_inner(), query.into_inner()).await
}

/// `/entities` is wired onto the exact same handler as `/changes` — the
/// upstream source registers both paths against one handler rather than
/// a dedicated entities-only variant.
#[get("/datasets/{dataset}/entities")]
pub async fn get_entities(
    state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    query: web::Query<ChangesQuery>,
) -> Result<HttpResponse, WebError> {
    stream_dataset(state, path.into_inner(), query.into_inner()).await
}

async fn stream_dataset(
    state: web::Data<Arc<AppState>>,
    dataset: String,
    query: ChangesQuery,
) -> Result<HttpResponse, WebError> {
    let datalayer = state.current_datalayer().await;
    let table = datalayer
        .table_mapping(&dataset)
        .ok_or_else(|| WebError::from(DatalayerError::UnknownDataset(dataset.clone())))?
        .clone();

    // Resolved and pinged up front so a connection failure comes back as
    // a clean 500 instead of a response that's already committed to 200.
    let url = datalayer.connection_url(&table)?;
    state.conn_mgr.ensure_read(&datalayer.digest, &url).await?;

    let context = context_for(&datalayer, &table);
    let request = DatasetRequest {
        dataset_name: dataset.clone(),
        since: query.since.unwrap_or_default(),
        limit: query.limit.unwrap_or(0),
    };

    let conn_mgr = state.conn_mgr.clone();
    let (tx, rx) = mpsc::channel::<Result<web::Bytes, std::io::Error>>(32);

    tokio::spawn(async move {
        let header = match serde_json::to_string(&context) {
            Ok(body) => format!("[{body}"),
            Err(e) => {
                tracing::error!("failed to encode context for dataset {dataset}: {e}");
                return;
            }
        };
        if tx.send(Ok(web::Bytes::from(header))).await.is_err() {
            return;
        }

        let result = change_extractor::change_set(&datalayer, &conn_mgr, &request, |entity| {
            let tx = tx.clone();
            async move { emit_entity(&tx, &entity).await }
        })
        .await;

        match result {
            Ok(()) => {
                let _ = tx.send(Ok(web::Bytes::from_static(b"]"))).await;
            }
            Err(e) => {
                // No closing `]` written: the client sees a truncated
                // array and must treat the stream as broken.
                tracing::warn!("broken stream for dataset {dataset}: {e}");
            }
        }
    });

    Ok(HttpResponse::Ok()
        .content_type("application/json")
        .streaming(ReceiverStream::new(rx)))
}

async fn emit_entity(
    tx: &mpsc::Sender<Result<web::Bytes, std::io::Error>>,
    entity: &Entity,
) -> common::err::CResult<()> {
    let encoded = StreamElement::for_entity(entity)
        .to_json_string()
        .map_err(DatalayerError::from)?;
    tx.send(Ok(web::Bytes::from(format!(",{encoded}"))))
        .await
        .map_err(|_| DatalayerError::WriteFailed("client disconnected mid-stream".into()))
}

#[post("/datasets/{dataset}/changes")]
pub async fn post_changes(
    state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, WebError> {
    post_dataset(state, path.into_inner(), body).await
}

#[post("/datasets/{dataset}/entities")]
pub async fn post_entities(
    state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, WebError> {
    post_dataset(state, path.into_inner(), body).await
}

/// Parses the body as `[@context, entity, entity, ...]`, chunks the
/// entities by the post mapping's `batch_size`, and runs each chunk
/// through the write-back planner. A simplification of the upstream
/// source's incrementally-decoded stream: the whole body is buffered and
/// parsed at once rather than value-at-a-time, which is fine at the
/// batch sizes this datalayer is configured with.
async fn post_dataset(
    state: web::Data<Arc<AppState>>,
    dataset: String,
    body: web::Bytes,
) -> Result<HttpResponse, WebError> {
    let datalayer = state.current_datalayer().await;
    let post = datalayer
        .post_mapping(&dataset)
        .ok_or_else(|| WebError::from(DatalayerError::UnknownDataset(dataset.clone())))?;
    let batch_size = post.batch_size.max(1);

    let values: Vec<JsonValue> = serde_json::from_slice(&body).map_err(|e| {
        WebError::from(DatalayerError::BadRequest(format!(
            "could not parse the json payload: {e}"
        )))
    })?;

    let mut values = values.into_iter();
    let namespaces = values.next().map(|v| parse_namespaces(&v)).unwrap_or_default();

    let mut batch = Vec::with_capacity(batch_size);
    for value in values {
        batch.push(Entity::from_wire(&value).map_err(WebError::from)?);
        if batch.len() == batch_size {
            let chunk = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            writeback::post_entities(&datalayer, &state.conn_mgr, &dataset, chunk, &namespaces).await?;
        }
    }
    if !batch.is_empty() {
        writeback::post_entities(&datalayer, &state.conn_mgr, &dataset, batch, &namespaces).await?;
    }

    Ok(HttpResponse::Ok().finish())
}

fn parse_namespaces(context: &JsonValue) -> HashMap<String, String> {
    context
        .get("namespaces")
        .and_then(JsonValue::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
