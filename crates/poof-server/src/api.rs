//! HTTP API.
//!
//! Three JSON endpoints over a [`SecretStore`]:
//!
//! - `POST /api/send` (form: `enc`, `hash`, `ttl`) → `{key, errors}`
//! - `POST /api/recv` (form: `key`, `hash`) → `{enc, errors}`
//! - `GET /api/stats` → `{size, added, expired, burned}`
//!
//! Every other request gets `404 {"errors":["invalid request"]}`. Inputs are
//! validated with [`poof_core::validate`] before the store is touched; the
//! store itself never sees malformed keys or out-of-range TTLs.

use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{DefaultBodyLimit, State, rejection::FormRejection},
    http::StatusCode,
    routing::{get, post},
};
use poof_core::validate::{ValidationError, validate_recv, validate_send};
use serde::{Deserialize, Serialize};

use crate::storage::{SecretStore, StoreError};

/// Shown when the store refuses new secrets.
pub const CAPACITY_MESSAGE: &str = "Service at Capacity, please wait for secrets to burn or expire";

/// Shown for unknown, wrong-hash, burned and expired secrets alike.
pub const MISSING_MESSAGE: &str = "`key` does not exist, is burned or has expired";

const INVALID_REQUEST_MESSAGE: &str = "invalid request";
const INTERNAL_MESSAGE: &str = "internal storage error";

/// Shared state passed to all handlers via the axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Backend selected at startup
    pub store: Arc<dyn SecretStore>,
}

/// Form body of `POST /api/send`. Missing fields read as empty.
#[derive(Debug, Default, Deserialize)]
pub struct SendForm {
    #[serde(default)]
    enc: String,
    #[serde(default)]
    hash: String,
    #[serde(default)]
    ttl: String,
}

/// Form body of `POST /api/recv`. Missing fields read as empty.
#[derive(Debug, Default, Deserialize)]
pub struct RecvForm {
    #[serde(default)]
    key: String,
    #[serde(default)]
    hash: String,
}

/// Response of `POST /api/send`.
#[derive(Debug, Serialize)]
pub struct SendResponse {
    key: Option<String>,
    errors: Vec<String>,
}

/// Response of `POST /api/recv`.
#[derive(Debug, Serialize)]
pub struct RecvResponse {
    enc: Option<String>,
    errors: Vec<String>,
}

/// Response of `GET /api/stats`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    size: u64,
    added: u64,
    expired: u64,
    burned: u64,
}

/// Response carrying only errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    errors: Vec<String>,
}

impl SendResponse {
    fn failed(errors: Vec<String>) -> Json<Self> {
        Json(Self { key: None, errors })
    }
}

impl RecvResponse {
    fn failed(errors: Vec<String>) -> Json<Self> {
        Json(Self { enc: None, errors })
    }
}

fn messages(errors: &[ValidationError]) -> Vec<String> {
    errors.iter().map(ToString::to_string).collect()
}

/// Run a store call on the blocking pool; durable commits fsync.
async fn blocking<T: Send + 'static>(
    call: impl FnOnce() -> Result<T, StoreError> + Send + 'static,
) -> Result<T, StoreError> {
    tokio::task::spawn_blocking(call).await.map_err(|e| StoreError::Runtime(e.to_string()))?
}

/// Build the router with all API routes.
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/send", post(send).fallback(not_found))
        .route("/api/recv", post(recv).fallback(not_found))
        .route("/api/stats", get(stats).fallback(not_found))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// POST /api/send: store a secret and return its key.
async fn send(
    State(state): State<AppState>,
    form: Result<Form<SendForm>, FormRejection>,
) -> (StatusCode, Json<SendResponse>) {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            return (StatusCode::BAD_REQUEST, SendResponse::failed(vec![rejection.body_text()]));
        },
    };

    let valid = match validate_send(&form.enc, &form.hash, &form.ttl) {
        Ok(valid) => valid,
        Err(errors) => return (StatusCode::BAD_REQUEST, SendResponse::failed(messages(&errors))),
    };

    let (enc, hash, ttl_secs) = (valid.enc.to_owned(), valid.hash.to_owned(), valid.ttl_secs);
    let store = Arc::clone(&state.store);

    match blocking(move || store.set(&enc, &hash, ttl_secs)).await {
        Ok(key) => {
            (StatusCode::OK, Json(SendResponse { key: Some(key.to_base64()), errors: Vec::new() }))
        },
        Err(StoreError::AtCapacity { capacity }) => {
            tracing::warn!(capacity, "Rejected secret: store at capacity");
            (StatusCode::SERVICE_UNAVAILABLE, SendResponse::failed(vec![CAPACITY_MESSAGE.into()]))
        },
        Err(e) => {
            tracing::error!("Failed to store secret: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, SendResponse::failed(vec![INTERNAL_MESSAGE.into()]))
        },
    }
}

/// POST /api/recv: release a secret exactly once.
async fn recv(
    State(state): State<AppState>,
    form: Result<Form<RecvForm>, FormRejection>,
) -> (StatusCode, Json<RecvResponse>) {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            return (StatusCode::BAD_REQUEST, RecvResponse::failed(vec![rejection.body_text()]));
        },
    };

    let valid = match validate_recv(&form.key, &form.hash) {
        Ok(valid) => valid,
        Err(errors) => return (StatusCode::BAD_REQUEST, RecvResponse::failed(messages(&errors))),
    };

    let (key, hash) = (valid.key, valid.hash.to_owned());
    let store = Arc::clone(&state.store);

    match blocking(move || store.get(&key, &hash)).await {
        Ok(Some(enc)) => (StatusCode::OK, Json(RecvResponse { enc: Some(enc), errors: Vec::new() })),
        Ok(None) => {
            (StatusCode::BAD_REQUEST, RecvResponse::failed(vec![MISSING_MESSAGE.into()]))
        },
        Err(e) => {
            // Reported as a miss so failures leak nothing about the key
            tracing::error!(%key, "Failed to release secret: {}", e);
            (StatusCode::BAD_REQUEST, RecvResponse::failed(vec![MISSING_MESSAGE.into()]))
        },
    }
}

/// GET /api/stats: store counters.
async fn stats(
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let store = Arc::clone(&state.store);

    match blocking(move || store.metrics()).await {
        Ok(metrics) => Ok(Json(StatsResponse {
            size: metrics.live,
            added: metrics.added,
            expired: metrics.expired,
            burned: metrics.burned,
        })),
        Err(e) => {
            tracing::error!("Failed to read metrics: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse { errors: vec![INTERNAL_MESSAGE.into()] }),
            ))
        },
    }
}

async fn not_found() -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { errors: vec![INVALID_REQUEST_MESSAGE.into()] }))
}
