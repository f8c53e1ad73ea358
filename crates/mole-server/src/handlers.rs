//! HTTP Handlers
//!
//! Tunnel-definition endpoints and the health probe. Everything under
//! `/tunnel/` runs behind the ticket middleware.

use crate::store::StoreError;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;
use tracing::info;

/// GET /tunnel/ - names of stored tunnel definitions.
pub async fn list_tunnels_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, StatusCode> {
    state
        .store
        .list()
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// GET /tunnel/{name} - raw TOML body of one definition.
pub async fn get_tunnel_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<String, StatusCode> {
    match state.store.get(&name).await {
        Ok(body) => {
            info!("served tunnel definition {}", name);
            Ok(body)
        }
        Err(StoreError::NotFound(_)) | Err(StoreError::InvalidName(_)) => {
            Err(StatusCode::NOT_FOUND)
        }
        Err(StoreError::Io(_)) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
