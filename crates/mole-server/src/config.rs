//! Server Configuration
//!
//! TOML-backed configuration for the companion server: bind address,
//! ticket lifetime, the tunnel-definition directory, and the user table.
//! Passwords are stored as hex BLAKE2s-256 digests, never in the clear.
//!
//! ```toml
//! bind = "0.0.0.0:4280"
//! ticket_ttl_secs = 3600
//! tunnels_dir = "./tunnels"
//!
//! [users]
//! jb = "89dee57..."   # blake2s-256 hex digest of the password
//! ```

use blake2::{Blake2s256, Digest};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Companion server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind: SocketAddr,
    /// How long a freshly granted or refreshed ticket lives, in seconds.
    pub ticket_ttl_secs: u64,
    /// Directory holding tunnel definition TOML files.
    pub tunnels_dir: PathBuf,
    /// Username to hex BLAKE2s-256 password digest.
    pub users: HashMap<String, String>,
}

impl ServerConfig {
    /// Load and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.display().to_string(), e.to_string()))?;
        let config: ServerConfig =
            toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate invariants a running server depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ticket_ttl_secs == 0 {
            return Err(ConfigError::ZeroTtl);
        }
        if self.users.is_empty() {
            return Err(ConfigError::NoUsers);
        }
        for (user, digest) in &self.users {
            if user.is_empty() {
                return Err(ConfigError::EmptyUser);
            }
            // BLAKE2s-256 renders to 64 hex characters.
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ConfigError::BadDigest(user.clone()));
            }
        }
        Ok(())
    }

    /// Check a plaintext password against the stored digest for `user`.
    pub fn check_password(&self, user: &str, password: &str) -> bool {
        match self.users.get(user) {
            Some(stored) => hash_password(password) == stored.to_ascii_lowercase(),
            None => false,
        }
    }
}

/// Hex BLAKE2s-256 digest of a password, as stored in the user table.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Blake2s256::new();
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {0}: {1}")]
    Io(String, String),

    #[error("invalid configuration: {0}")]
    Parse(String),

    #[error("ticket_ttl_secs must be greater than zero")]
    ZeroTtl,

    #[error("user table is empty")]
    NoUsers,

    #[error("user table contains an empty username")]
    EmptyUser,

    #[error("user {0} has a digest that is not 64 hex characters")]
    BadDigest(String),
}
