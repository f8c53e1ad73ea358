//! Tunnel Description
//!
//! Declarative TOML description of a tunnel: the SSH bounce chain, the
//! local port forwards, and optionally the companion server to fetch
//! tickets and definitions from.
//!
//! ```toml
//! name = "staging-db"
//!
//! [[hops]]
//! host = "bastion.example.com"
//! user = "jb"
//!
//! [[hops]]
//! host = "10.0.12.7"
//! port = 2222
//!
//! [[forwards]]
//! local = "127.0.0.1:5432"
//! remote_host = "db.internal"
//! remote_port = 5432
//!
//! [server]
//! url = "http://mole.example.com:4280"
//! user = "jb"
//! ```

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

fn default_ssh_port() -> u16 {
    22
}

/// One SSH hop in the bounce chain.
#[derive(Debug, Clone, Deserialize)]
pub struct HopConfig {
    /// Hostname or address of the hop.
    pub host: String,
    /// SSH port.
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Login user; defaults to the invoking user when absent.
    pub user: Option<String>,
    /// Identity file for this hop.
    pub identity: Option<PathBuf>,
}

impl HopConfig {
    /// `user@host` form used in ssh destinations and jump lists.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    /// `user@host:port` form for `-J` jump lists.
    pub fn jump_spec(&self) -> String {
        format!("{}:{}", self.destination(), self.port)
    }
}

/// One local listener relayed to a remote destination.
#[derive(Debug, Clone, Deserialize)]
pub struct ForwardConfig {
    /// Local bind address, e.g. `127.0.0.1:5432`.
    pub local: SocketAddr,
    /// Destination host as seen from the tunnel exit.
    pub remote_host: String,
    /// Destination port.
    pub remote_port: u16,
}

impl ForwardConfig {
    /// `host:port` destination string.
    pub fn remote(&self) -> String {
        format!("{}:{}", self.remote_host, self.remote_port)
    }
}

/// Companion server to fetch tickets and definitions from.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL, plain HTTP (tickets travel in headers, not cookies).
    pub url: String,
    /// User to authenticate as.
    pub user: String,
}

/// A complete tunnel description.
#[derive(Debug, Clone, Deserialize)]
pub struct TunnelConfig {
    /// Tunnel name, used for logs and for server-side lookup.
    pub name: String,
    /// SSH bounce chain, first hop outermost. May be empty for direct
    /// TCP relays (e.g. through an already-established VPN).
    #[serde(default)]
    pub hops: Vec<HopConfig>,
    /// Local port forwards.
    #[serde(default)]
    pub forwards: Vec<ForwardConfig>,
    /// Companion server, if tickets/definitions are fetched remotely.
    pub server: Option<ApiConfig>,
}

impl TunnelConfig {
    /// Parse a TOML document.
    pub fn from_str(text: &str) -> Result<Self, TunnelConfigError> {
        let config: TunnelConfig =
            toml::from_str(text).map_err(|e| TunnelConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a description file.
    pub fn from_file(path: &Path) -> Result<Self, TunnelConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| TunnelConfigError::Io(path.display().to_string(), e.to_string()))?;
        Self::from_str(&text)
    }

    /// Validate invariants the manager depends on.
    pub fn validate(&self) -> Result<(), TunnelConfigError> {
        if self.name.is_empty() {
            return Err(TunnelConfigError::EmptyName);
        }
        if self.forwards.is_empty() {
            return Err(TunnelConfigError::NoForwards);
        }
        for forward in &self.forwards {
            if forward.remote_port == 0 {
                return Err(TunnelConfigError::InvalidPort(forward.remote()));
            }
            if forward.remote_host.is_empty() {
                return Err(TunnelConfigError::EmptyHost);
            }
        }
        for hop in &self.hops {
            if hop.host.is_empty() {
                return Err(TunnelConfigError::EmptyHost);
            }
            if hop.port == 0 {
                return Err(TunnelConfigError::InvalidPort(hop.host.clone()));
            }
        }
        Ok(())
    }
}

/// Tunnel description errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum TunnelConfigError {
    #[error("cannot read {0}: {1}")]
    Io(String, String),

    #[error("invalid tunnel description: {0}")]
    Parse(String),

    #[error("tunnel name is empty")]
    EmptyName,

    #[error("tunnel has no forwards")]
    NoForwards,

    #[error("invalid port in {0}")]
    InvalidPort(String),

    #[error("empty host in tunnel description")]
    EmptyHost,
}
