//! Router and request handlers
//!
//! Paths are owner- and store-scoped:
//!
//! | Method | Path |
//! |--------|------|
//! | GET/POST | `/{owner}/stores` |
//! | GET/PUT/DELETE | `/{owner}/stores/{store_id}` |
//! | GET/POST | `/{owner}/stores/{store_id}/keys` |
//! | GET/PUT/DELETE | `/{owner}/stores/{store_id}/keys/{key}` |
//! | PUT | `/{owner}/stores/{store_id}/upload` |
//! | GET | `/{owner}/stores/{store_id}/search` |
//!
//! Row bodies are the bare data mapping, exactly what lands in the row's
//! `data`. Upload bodies are newline-delimited items; upload and search
//! responses are newline-delimited envelopes.

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::StreamExt;

use shelf_core::{JsonMap, OwnerId, RowId, StoreId};
use shelf_engine::{BulkItem, CreateStoreRequest, StoreUpdate};

use crate::envelope::{failure_body, row_payload, store_payload, success, ApiFailure};
use crate::AppState;

const NDJSON: &str = "application/x-ndjson";

/// Default page size for key listings
const DEFAULT_PAGE: usize = 100;
/// Upper bound a client may request per page
const MAX_PAGE: usize = 1000;

/// Build the full route table over shared state
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/{owner}/stores", get(list_stores).post(create_store))
        .route(
            "/{owner}/stores/{store_id}",
            get(get_store).put(update_store).delete(delete_store),
        )
        .route(
            "/{owner}/stores/{store_id}/keys",
            get(list_keys).post(create_row),
        )
        .route(
            "/{owner}/stores/{store_id}/keys/{key}",
            get(get_row).put(update_row).delete(delete_row),
        )
        .route("/{owner}/stores/{store_id}/upload", put(upload))
        .route("/{owner}/stores/{store_id}/search", get(search))
        .with_state(state)
}

// ============================================================================
// Store handlers
// ============================================================================

async fn list_stores(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<Json<serde_json::Value>, ApiFailure> {
    let records = state.catalog.list_stores(&OwnerId::new(owner)).await?;
    let stores: Vec<_> = records.iter().map(store_payload).collect();
    Ok(success(json!({ "stores": stores })))
}

async fn create_store(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(request): Json<CreateStoreRequest>,
) -> Result<Response, ApiFailure> {
    let record = state
        .catalog
        .create_store(&OwnerId::new(owner), request)
        .await?;
    let body = success(json!({ "store": store_payload(&record) }));
    Ok((StatusCode::CREATED, body).into_response())
}

async fn get_store(
    State(state): State<AppState>,
    Path((owner, store_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiFailure> {
    let record = state
        .catalog
        .get_store(&OwnerId::new(owner), &StoreId::new(store_id))
        .await?;
    Ok(success(json!({ "store": store_payload(&record) })))
}

async fn update_store(
    State(state): State<AppState>,
    Path((owner, store_id)): Path<(String, String)>,
    Json(update): Json<StoreUpdate>,
) -> Result<Json<serde_json::Value>, ApiFailure> {
    let record = state
        .catalog
        .update_store(&OwnerId::new(owner), &StoreId::new(store_id), update)
        .await?;
    Ok(success(json!({ "store": store_payload(&record) })))
}

async fn delete_store(
    State(state): State<AppState>,
    Path((owner, store_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiFailure> {
    state
        .catalog
        .delete_store(&OwnerId::new(owner), &StoreId::new(store_id))
        .await?;
    Ok(success(json!({})))
}

// ============================================================================
// Row handlers
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
    token: Option<String>,
}

async fn list_keys(
    State(state): State<AppState>,
    Path((owner, store_id)): Path<(String, String)>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ApiFailure> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    let page = state
        .repository
        .list_row_ids(
            &OwnerId::new(owner),
            &StoreId::new(store_id),
            limit,
            params.token.as_deref(),
        )
        .await?;
    let mut payload = json!({ "keys": page.ids });
    if let Some(next) = page.next {
        payload["next"] = json!(next);
    }
    Ok(success(payload))
}

async fn create_row(
    State(state): State<AppState>,
    Path((owner, store_id)): Path<(String, String)>,
    Json(data): Json<JsonMap>,
) -> Result<Response, ApiFailure> {
    let row = state
        .repository
        .create_row(&OwnerId::new(owner), &StoreId::new(store_id), None, &data)
        .await?;
    let body = success(json!({ "row": row_payload(&row) }));
    Ok((StatusCode::CREATED, body).into_response())
}

async fn get_row(
    State(state): State<AppState>,
    Path((owner, store_id, key)): Path<(String, String, String)>,
) -> Result<Json<serde_json::Value>, ApiFailure> {
    let row = state
        .repository
        .get_row(
            &OwnerId::new(owner),
            &StoreId::new(store_id),
            &RowId::new(key),
        )
        .await?;
    Ok(success(json!({ "row": row_payload(&row) })))
}

async fn update_row(
    State(state): State<AppState>,
    Path((owner, store_id, key)): Path<(String, String, String)>,
    Json(data): Json<JsonMap>,
) -> Result<Json<serde_json::Value>, ApiFailure> {
    let row = state
        .repository
        .update_row(
            &OwnerId::new(owner),
            &StoreId::new(store_id),
            &RowId::new(key),
            &data,
        )
        .await?;
    Ok(success(json!({ "row": row_payload(&row) })))
}

async fn delete_row(
    State(state): State<AppState>,
    Path((owner, store_id, key)): Path<(String, String, String)>,
) -> Result<Json<serde_json::Value>, ApiFailure> {
    state
        .repository
        .delete_row(
            &OwnerId::new(owner),
            &StoreId::new(store_id),
            &RowId::new(key),
        )
        .await?;
    Ok(success(json!({})))
}

// ============================================================================
// Streaming handlers
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: Option<String>,
}

async fn search(
    State(state): State<AppState>,
    Path((owner, store_id)): Path<(String, String)>,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiFailure> {
    let stream = state
        .query
        .search(
            &OwnerId::new(owner),
            &StoreId::new(store_id),
            params.query.as_deref().unwrap_or(""),
        )
        .await?;

    let lines = stream.map(|item| {
        let line = match item {
            Ok(row) => success(json!({ "row": row_payload(&row) })).0,
            Err(err) => failure_body(&err),
        };
        Ok::<_, std::convert::Infallible>(ndjson_line(&line))
    });
    Ok(ndjson_response(Body::from_stream(lines)))
}

async fn upload(
    State(state): State<AppState>,
    Path((owner, store_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, ApiFailure> {
    let items = match parse_upload(&body) {
        Ok(items) => items,
        Err(reason) => {
            let body = json!({"success": false, "reason": reason});
            return Ok((StatusCode::BAD_REQUEST, Json(body)).into_response());
        }
    };

    let outcomes = state
        .bulk
        .ingest(OwnerId::new(owner), StoreId::new(store_id), items);
    let lines = outcomes.map(|outcome| {
        let line = match outcome.result {
            Ok(row) => success(json!({
                "position": outcome.position,
                "row": row_payload(&row),
            }))
            .0,
            Err(err) => {
                let mut line = failure_body(&err);
                line["position"] = json!(outcome.position);
                line
            }
        };
        Ok::<_, std::convert::Infallible>(ndjson_line(&line))
    });
    Ok(ndjson_response(Body::from_stream(lines)))
}

/// One item per non-empty line
fn parse_upload(body: &[u8]) -> Result<Vec<BulkItem>, String> {
    let text = std::str::from_utf8(body).map_err(|_| "upload body is not UTF-8".to_string())?;
    let mut items = Vec::new();
    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str::<BulkItem>(line)
            .map_err(|e| format!("malformed upload item on line {}: {}", number + 1, e))?;
        items.push(item);
    }
    Ok(items)
}

fn ndjson_line(value: &serde_json::Value) -> Bytes {
    let mut line = value.to_string();
    line.push('\n');
    Bytes::from(line)
}

fn ndjson_response(body: Body) -> Response {
    ([(header::CONTENT_TYPE, NDJSON)], body).into_response()
}
