//! HTTP handlers for the campus-insight service. One function per route,
//! following the teacher's `server/src/api.rs` convention: a handler reads
//! request data, calls into the facade, and converts the `Result` into a
//! JSON response — errors carry their own `IntoResponse` impl, so handlers
//! never build status codes themselves.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};

use crate::error::Error;
use crate::facade::Facade;
use crate::model::DatasetKind;

/// Shared state handed to every handler: the facade plus the one piece of
/// request-framing config the HTTP layer itself must enforce (the archive
/// size cap — everything else is the facade's concern).
pub struct AppState {
    pub facade: Facade,
    pub max_archive_bytes: u64,
}

/// `PUT /dataset/:id/:kind` — body is raw archive bytes; re-encoded to
/// base64 before handing off to the facade, which is base64-in throughout.
pub async fn put_dataset(
    State(state): State<Arc<AppState>>,
    Path((id, kind)): Path<(String, String)>,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, Error> {
    if body.len() as u64 > state.max_archive_bytes {
        return Err(Error::InvalidContent(format!(
            "archive is {} bytes, exceeds the {}-byte limit",
            body.len(),
            state.max_archive_bytes
        )));
    }
    let kind = DatasetKind::parse(&kind)?;
    let payload = BASE64.encode(&body);
    let ids = state.facade.add_dataset(&id, kind, &payload).await?;
    Ok(Json(json!({ "result": ids })))
}

/// `DELETE /dataset/:id`
pub async fn delete_dataset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let removed = state.facade.remove_dataset(&id).await?;
    Ok(Json(json!({ "result": removed })))
}

/// `GET /datasets`
pub async fn list_datasets(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, Error> {
    let datasets = state.facade.list_datasets().await?;
    Ok(Json(json!({ "result": datasets })))
}

/// `POST /query`
pub async fn query(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Result<impl IntoResponse, Error> {
    let rows = state.facade.perform_query(&body).await?;
    Ok(Json(json!({ "result": rows })))
}

/// `GET /echo/:msg` — trivial liveness probe, no facade involvement.
pub async fn echo(Path(msg): Path<String>) -> impl IntoResponse {
    Json(json!({ "result": format!("{msg}...{msg}") }))
}
