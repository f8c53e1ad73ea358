//! Ticket Authentication
//!
//! Grant endpoint and verification middleware. The flow mirrors the
//! ticket core's contract:
//!
//! - `POST /ticket/{user}` with the password as the raw body returns a
//!   ticket string (401 on bad credentials). A request that already
//!   carries a still-valid ticket for the same user gets it refreshed
//!   (observed IP merged, expiry extended) instead of a fresh grant.
//! - Protected routes go through [`ticket_middleware`], which verifies
//!   the `X-Mole-Ticket` header against the transport-level peer address
//!   and stamps `X-Mole-Authenticated` for downstream handlers.
//!
//! Every verification failure collapses to a bare 403; the concrete
//! error kind is only visible in server-side logs.

use crate::AppState;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use mole_ticket::TicketInfo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Header carrying the bearer ticket on requests.
pub const TICKET_HEADER: &str = "x-mole-ticket";

/// Header stamped onto verified requests with the authenticated user.
pub const AUTHENTICATED_HEADER: HeaderName = HeaderName::from_static("x-mole-authenticated");

/// Current UNIX time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// POST /ticket/{user} - password in, ticket string out.
pub async fn grant_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(user): Path<String>,
    headers: HeaderMap,
    password: String,
) -> Result<String, StatusCode> {
    if !state.config.check_password(&user, &password) {
        warn!("rejected credentials for {} from {}", user, peer.ip());
        return Err(StatusCode::UNAUTHORIZED);
    }

    let now = unix_now();
    let expires_at = now + state.config.ticket_ttl_secs;

    // Rolling session: a presented ticket that still verifies structurally,
    // belongs to this user, and is unexpired gets renewed so its IP history
    // carries over. Anything else falls through to a fresh single-IP grant.
    if let Some(prior) = headers.get(TICKET_HEADER).and_then(|v| v.to_str().ok()) {
        if let Ok(loaded) = state.service.load(prior) {
            if loaded.user == user {
                if let Ok(renewed) = state.service.refresh(prior, peer.ip(), expires_at, now) {
                    info!("refreshed ticket for {} from {}", user, peer.ip());
                    return Ok(renewed);
                }
            }
        }
    }

    match state.service.grant(&user, peer.ip(), expires_at) {
        Ok(ticket) => {
            info!(
                "granted ticket for {} from {} (expires {})",
                user,
                peer.ip(),
                expires_at
            );
            Ok(ticket)
        }
        Err(e) => {
            warn!("grant failed for {}: {}", user, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /ticket/ - restricted projection of the presented ticket.
///
/// Runs behind [`ticket_middleware`], so the header is present and has
/// already verified; the projection exposes only user, authorized IPs,
/// and expiry.
pub async fn inspect_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<TicketInfo>, StatusCode> {
    let ticket = headers
        .get(TICKET_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::FORBIDDEN)?;

    state
        .service
        .load(ticket)
        .map(|t| Json(t.info()))
        .map_err(|_| StatusCode::FORBIDDEN)
}

/// Verification middleware for protected routes.
///
/// The caller's IP is the transport-level peer address; a client-supplied
/// header is never trusted for it.
pub async fn ticket_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let ticket = request
        .headers()
        .get(TICKET_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::FORBIDDEN)?;

    match state.service.verify(ticket, peer.ip(), unix_now()) {
        Ok(user) => {
            let value = HeaderValue::from_str(&user).map_err(|_| StatusCode::FORBIDDEN)?;
            request.headers_mut().insert(AUTHENTICATED_HEADER, value);
            Ok(next.run(request).await)
        }
        Err(e) => {
            // Log the kind locally; the response stays an opaque 403.
            warn!("ticket rejected from {}: {}", peer.ip(), e);
            Err(StatusCode::FORBIDDEN)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{hash_password, ServerConfig};
    use crate::store::TunnelStore;
    use mole_ticket::{KeyStore, TicketService};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn state() -> Arc<AppState> {
        let mut users = HashMap::new();
        users.insert("jb".to_string(), hash_password("hunter2"));

        let config = ServerConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            ticket_ttl_secs: 3600,
            tunnels_dir: std::env::temp_dir(),
            users,
        };
        let service = TicketService::new(Arc::new(KeyStore::with_rng(StdRng::seed_from_u64(5))));
        let store = TunnelStore::new(config.tunnels_dir.clone());

        Arc::new(AppState {
            service,
            config,
            store,
        })
    }

    fn peer() -> SocketAddr {
        "10.2.3.4:55123".parse().unwrap()
    }

    #[tokio::test]
    async fn test_grant_with_good_password() {
        let state = state();

        let ticket = grant_handler(
            State(state.clone()),
            ConnectInfo(peer()),
            Path("jb".to_string()),
            HeaderMap::new(),
            "hunter2".to_string(),
        )
        .await
        .unwrap();

        let user = state
            .service
            .verify(&ticket, peer().ip(), unix_now())
            .unwrap();
        assert_eq!(user, "jb");
    }

    #[tokio::test]
    async fn test_grant_rejects_bad_password() {
        let state = state();

        let result = grant_handler(
            State(state),
            ConnectInfo(peer()),
            Path("jb".to_string()),
            HeaderMap::new(),
            "wrong".to_string(),
        )
        .await;

        assert_eq!(result, Err(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_grant_rejects_unknown_user() {
        let state = state();

        let result = grant_handler(
            State(state),
            ConnectInfo(peer()),
            Path("mallory".to_string()),
            HeaderMap::new(),
            "hunter2".to_string(),
        )
        .await;

        assert_eq!(result, Err(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_grant_refreshes_presented_ticket() {
        let state = state();

        let first = grant_handler(
            State(state.clone()),
            ConnectInfo(peer()),
            Path("jb".to_string()),
            HeaderMap::new(),
            "hunter2".to_string(),
        )
        .await
        .unwrap();

        // Same user, new apparent address, prior ticket attached.
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(TICKET_HEADER),
            HeaderValue::from_str(&first).unwrap(),
        );
        let roamed: SocketAddr = "10.9.9.9:40000".parse().unwrap();

        let renewed = grant_handler(
            State(state.clone()),
            ConnectInfo(roamed),
            Path("jb".to_string()),
            headers,
            "hunter2".to_string(),
        )
        .await
        .unwrap();

        // Both the original and the roamed address verify now.
        let now = unix_now();
        assert!(state.service.verify(&renewed, peer().ip(), now).is_ok());
        assert!(state.service.verify(&renewed, roamed.ip(), now).is_ok());
    }

    #[tokio::test]
    async fn test_inspect_projects_ticket() {
        let state = state();
        let now = unix_now();
        let ticket = state
            .service
            .grant("jb", peer().ip(), now + 60)
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(TICKET_HEADER),
            HeaderValue::from_str(&ticket).unwrap(),
        );

        let Json(info) = inspect_handler(State(state), headers).await.unwrap();
        assert_eq!(info.user, "jb");
        assert_eq!(info.authorized_ips, vec![peer().ip()]);
        assert_eq!(info.expires_at, now + 60);
    }

    #[tokio::test]
    async fn test_inspect_rejects_garbage() {
        let state = state();
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(TICKET_HEADER),
            HeaderValue::from_static("AAAA"),
        );

        let result = inspect_handler(State(state), headers).await;
        assert!(result.is_err());
    }
}
