//! mole-server - Companion Server
//!
//! Stores tunnel definitions and issues short-lived, IP-bound access
//! tickets over plain HTTP headers. Routes:
//!
//! ```text
//! POST /ticket/{user}   password body  -> ticket string   (public)
//! GET  /ticket/         ticket header  -> JSON projection (protected)
//! GET  /tunnel/         ticket header  -> definition list (protected)
//! GET  /tunnel/{name}   ticket header  -> TOML body       (protected)
//! GET  /health                         -> liveness probe  (public)
//! ```
//!
//! The session key lives only in this process; restarting the server
//! (or calling [`mole_ticket::TicketService::rotate`]) invalidates every
//! outstanding ticket at once.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod store;

pub use auth::{AUTHENTICATED_HEADER, TICKET_HEADER};
pub use config::{hash_password, ConfigError, ServerConfig};
pub use store::{StoreError, TunnelStore};

use axum::routing::{get, post};
use axum::{middleware, Router};
use mole_ticket::{KeyStore, TicketService};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    pub service: TicketService,
    pub config: ServerConfig,
    pub store: TunnelStore,
}

/// Build the router around shared state.
pub fn router(state: Arc<AppState>) -> Router {
    // Protected routes (require a verified ticket)
    let protected = Router::new()
        .route("/ticket/", get(auth::inspect_handler))
        .route("/tunnel/", get(handlers::list_tunnels_handler))
        .route("/tunnel/{name}", get(handlers::get_tunnel_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::ticket_middleware,
        ));

    Router::new()
        // Public routes
        .route("/health", get(handlers::health_handler))
        .route("/ticket/{user}", post(auth::grant_handler))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the server until the listener fails or the process stops.
pub async fn serve(config: ServerConfig) -> Result<(), ServerError> {
    // Fresh session key per process start: outstanding tickets from a
    // previous run are invalid by construction.
    let service = TicketService::new(Arc::new(KeyStore::new()));
    let store = TunnelStore::new(config.tunnels_dir.clone());
    let bind = config.bind;

    let state = Arc::new(AppState {
        service,
        config,
        store,
    });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| ServerError::Bind(bind, e.to_string()))?;
    info!("mole server listening on http://{}", bind);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| ServerError::Serve(e.to_string()))
}

/// Server lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("cannot bind {0}: {1}")]
    Bind(SocketAddr, String),

    #[error("server error: {0}")]
    Serve(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
