//! HTTP API of the Folio proxy server.
//!
//! One POST endpoint accepts `{"action": ..., "params": ...}` and runs it
//! against the configured backend. Failures come back with the error's HTTP
//! status and an `{"error": {...}}` body the proxy client turns back into
//! the same error.

use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use folio_backend::{Backend, BackendError, ErrorResponse, ProxyRequest, dispatch};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Path of the action endpoint.
pub const API_PATH: &str = "/api/v1";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ServerInfo {
    pub backend: String,
    pub version: String,
}

#[derive(Clone)]
struct AppState {
    backend: Arc<dyn Backend>,
}

async fn info_handler(State(state): State<AppState>) -> Json<ServerInfo> {
    Json(ServerInfo {
        backend: state.backend.name().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn action_handler(
    State(state): State<AppState>,
    request: Result<Json<ProxyRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => {
            debug!("Rejected request: {}", rejection.body_text());
            return error_response(&BackendError::Validation(rejection.body_text()));
        }
    };

    let action = request.action();
    match dispatch(state.backend.as_ref(), request).await {
        Ok(value) => Json(value).into_response(),
        Err(err) => {
            warn!("{} failed: {}", action, err);
            error_response(&err)
        }
    }
}

fn error_response(err: &BackendError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse::from(err))).into_response()
}

/// Build the HTTP API router serving `backend`.
pub fn build_router(backend: Arc<dyn Backend>) -> Router {
    Router::new()
        .route(API_PATH, post(action_handler))
        .route("/api/v1/info", get(info_handler))
        .with_state(AppState { backend })
}
