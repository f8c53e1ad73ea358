//! Tunnel Definition Store
//!
//! Directory-backed store of tunnel descriptions. Each definition is a
//! TOML file named `<tunnel>.toml`; the server hands the raw body to
//! authenticated clients, which parse it with mole-tunnel.

use std::path::{Path, PathBuf};

/// File-backed tunnel definition store.
#[derive(Debug, Clone)]
pub struct TunnelStore {
    dir: PathBuf,
}

impl TunnelStore {
    /// Create a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Names of all stored tunnel definitions, sorted.
    pub async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Raw TOML body of a stored definition.
    pub async fn get(&self, name: &str) -> Result<String, StoreError> {
        Self::check_name(name)?;

        let path = self.dir.join(format!("{name}.toml"));
        match tokio::fs::read_to_string(&path).await {
            Ok(body) => Ok(body),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    /// Does a definition exist?
    pub async fn exists(&self, name: &str) -> bool {
        Self::check_name(name).is_ok()
            && tokio::fs::try_exists(self.dir.join(format!("{name}.toml")))
                .await
                .unwrap_or(false)
    }

    /// Reject names that could escape the store directory.
    fn check_name(name: &str) -> Result<(), StoreError> {
        let sane = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if sane {
            Ok(())
        } else {
            Err(StoreError::InvalidName(name.to_string()))
        }
    }

    /// Directory the store reads from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Store errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("no tunnel definition named {0}")]
    NotFound(String),

    #[error("invalid tunnel name: {0}")]
    InvalidName(String),

    #[error("store I/O error: {0}")]
    Io(String),
}
