//! Companion Server Client
//!
//! Plain-HTTP client for the mole server: obtains and refreshes tickets,
//! lists and fetches tunnel definitions, and inspects the current
//! ticket. The ticket rides in the `X-Mole-Ticket` request header; the
//! server never sets cookies.

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use mole_ticket::TicketInfo;
use tracing::debug;
use url::Url;

/// Header carrying the bearer ticket on requests.
pub const TICKET_HEADER: &str = "x-mole-ticket";

/// HTTP client for the companion server.
pub struct ApiClient {
    base: Url,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl ApiClient {
    /// Create a client for the server at `base`, e.g.
    /// `http://mole.example.com:4280`.
    pub fn new(base: &str) -> Result<Self, ApiError> {
        let mut base =
            Url::parse(base).map_err(|e| ApiError::InvalidUrl(base.to_string(), e.to_string()))?;
        // Joining relative paths below requires a trailing slash.
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        Ok(Self {
            base,
            client: Client::builder(TokioExecutor::new()).build_http(),
        })
    }

    /// Obtain a ticket for `user`, optionally presenting a prior ticket
    /// so the server refreshes it instead of starting a fresh IP list.
    pub async fn fetch_ticket(
        &self,
        user: &str,
        password: &str,
        prior: Option<&str>,
    ) -> Result<String, ApiError> {
        let uri = self.endpoint(&format!("ticket/{user}"))?;

        let mut request = Request::builder().method(Method::POST).uri(uri);
        if let Some(prior) = prior {
            request = request.header(TICKET_HEADER, prior);
        }
        let request = request
            .body(Full::new(Bytes::from(password.to_string())))
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let (status, body) = self.send(request).await?;
        match status {
            StatusCode::OK => Ok(body),
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            other => Err(ApiError::UnexpectedStatus(other.as_u16())),
        }
    }

    /// Names of tunnel definitions stored on the server.
    pub async fn list_tunnels(&self, ticket: &str) -> Result<Vec<String>, ApiError> {
        let body = self.get("tunnel/", ticket).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Raw TOML body of a stored tunnel definition.
    pub async fn fetch_tunnel(&self, name: &str, ticket: &str) -> Result<String, ApiError> {
        self.get(&format!("tunnel/{name}"), ticket).await
    }

    /// The server-side projection of `ticket` (user, IPs, expiry).
    pub async fn inspect_ticket(&self, ticket: &str) -> Result<TicketInfo, ApiError> {
        let body = self.get("ticket/", ticket).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// GET `path` with the ticket header, mapping the auth status codes.
    async fn get(&self, path: &str, ticket: &str) -> Result<String, ApiError> {
        let uri = self.endpoint(path)?;
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(TICKET_HEADER, ticket)
            .body(Full::new(Bytes::new()))
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let (status, body) = self.send(request).await?;
        match status {
            StatusCode::OK => Ok(body),
            StatusCode::FORBIDDEN => Err(ApiError::Forbidden),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound(path.to_string())),
            other => Err(ApiError::UnexpectedStatus(other.as_u16())),
        }
    }

    async fn send(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<(StatusCode, String), ApiError> {
        debug!("{} {}", request.method(), request.uri());

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?
            .to_bytes();
        let body =
            String::from_utf8(bytes.to_vec()).map_err(|e| ApiError::Decode(e.to_string()))?;

        Ok((status, body))
    }

    fn endpoint(&self, path: &str) -> Result<hyper::Uri, ApiError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(path.to_string(), e.to_string()))?;
        url.as_str()
            .parse()
            .map_err(|_| ApiError::InvalidUrl(url.to_string(), String::new()))
    }
}

/// API client errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("invalid URL {0}: {1}")]
    InvalidUrl(String, String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("credentials rejected")]
    Unauthorized,

    #[error("ticket rejected")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected response status {0}")]
    UnexpectedStatus(u16),

    #[error("undecodable response: {0}")]
    Decode(String),
}
