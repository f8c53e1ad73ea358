//! Tunnel Manager
//!
//! Coordinates the SSH chain and the local forwarders into one tunnel
//! lifecycle. Tunnels with hops delegate the relaying to `ssh -L` and
//! supervise the process; hopless tunnels run direct TCP relays.
//!
//! # Usage
//!
//! ```rust,ignore
//! let config = TunnelConfig::from_file(Path::new("staging.toml"))?;
//! let mut tunnel = TunnelManager::new(config);
//! tunnel.connect().await?;
//!
//! if tunnel.is_connected().await {
//!     println!("{}", tunnel.status().await);
//! }
//!
//! tunnel.disconnect().await;
//! ```

use crate::api::ApiError;
use crate::config::TunnelConfig;
use crate::forward::{ForwardError, PortForwarder};
use crate::ssh::{SshError, SshProcess};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Tunnel connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// Tunnel is down
    Disconnected,
    /// Tunnel is being established
    Connecting,
    /// Tunnel is up and forwarding
    Connected,
    /// Establishment or supervision failed
    Failed,
    /// Re-establishing after a drop
    Reconnecting,
}

impl TunnelState {
    /// Check if the tunnel is usable
    pub fn is_connected(&self) -> bool {
        matches!(self, TunnelState::Connected)
    }

    /// Check if the tunnel is in a failure state
    pub fn is_failed(&self) -> bool {
        matches!(self, TunnelState::Failed)
    }
}

/// Tunnel lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("tunnel already connected")]
    AlreadyConnected,

    #[error("tunnel not connected")]
    NotConnected,

    #[error("ssh error: {0}")]
    Ssh(#[from] SshError),

    #[error("forward error: {0}")]
    Forward(#[from] ForwardError),

    #[error("server error: {0}")]
    Api(#[from] ApiError),

    #[error("too many reconnect attempts")]
    TooManyRetries,
}

/// Supervises one tunnel from a description to a working set of
/// forwards.
pub struct TunnelManager {
    /// Tunnel description
    config: TunnelConfig,
    /// Supervised ssh chain, when hops are configured
    ssh: Option<SshProcess>,
    /// Direct relays, for hopless tunnels
    forwarders: Vec<PortForwarder>,
    /// Current state
    state: Arc<RwLock<TunnelState>>,
    /// Connection started at
    connected_at: Option<Instant>,
    /// Reconnect attempts since the last good connection
    reconnect_attempts: u32,
}

impl TunnelManager {
    /// Create a manager for a validated description.
    pub fn new(config: TunnelConfig) -> Self {
        Self {
            config,
            ssh: None,
            forwarders: Vec::new(),
            state: Arc::new(RwLock::new(TunnelState::Disconnected)),
            connected_at: None,
            reconnect_attempts: 0,
        }
    }

    /// Get current state
    pub async fn state(&self) -> TunnelState {
        *self.state.read().await
    }

    /// Check if the tunnel is connected
    pub async fn is_connected(&self) -> bool {
        self.state().await.is_connected()
    }

    /// Establish the tunnel.
    pub async fn connect(&mut self) -> Result<(), TunnelError> {
        if self.state().await.is_connected() {
            return Err(TunnelError::AlreadyConnected);
        }

        info!("connecting tunnel {}", self.config.name);
        *self.state.write().await = TunnelState::Connecting;

        match self.start().await {
            Ok(()) => {
                *self.state.write().await = TunnelState::Connected;
                self.connected_at = Some(Instant::now());
                self.reconnect_attempts = 0;
                info!("tunnel {} connected", self.config.name);
                Ok(())
            }
            Err(e) => {
                error!("tunnel {} failed to connect: {}", self.config.name, e);
                *self.state.write().await = TunnelState::Failed;
                self.teardown().await;
                Err(e)
            }
        }
    }

    /// Tear the tunnel down.
    pub async fn disconnect(&mut self) {
        info!("disconnecting tunnel {}", self.config.name);
        *self.state.write().await = TunnelState::Disconnected;
        self.teardown().await;
        self.connected_at = None;
    }

    /// Re-establish after a drop, giving up after a few attempts.
    pub async fn reconnect(&mut self) -> Result<(), TunnelError> {
        self.reconnect_attempts += 1;

        if self.reconnect_attempts > 3 {
            error!("tunnel {}: too many reconnect attempts", self.config.name);
            *self.state.write().await = TunnelState::Failed;
            return Err(TunnelError::TooManyRetries);
        }

        warn!(
            "reconnecting tunnel {} (attempt {})",
            self.config.name, self.reconnect_attempts
        );
        *self.state.write().await = TunnelState::Reconnecting;
        self.teardown().await;

        // Brief delay before retry
        tokio::time::sleep(Duration::from_secs(2)).await;

        match self.start().await {
            Ok(()) => {
                *self.state.write().await = TunnelState::Connected;
                self.connected_at = Some(Instant::now());
                info!("tunnel {} reconnected", self.config.name);
                Ok(())
            }
            Err(e) => {
                error!("reconnection failed: {}", e);
                Err(e)
            }
        }
    }

    /// Is the supervised chain still alive? Hopless tunnels report true
    /// while connected.
    pub async fn is_chain_alive(&mut self) -> bool {
        match &mut self.ssh {
            Some(ssh) => ssh.is_running(),
            None => self.state().await.is_connected(),
        }
    }

    /// Bound local addresses of the direct relays.
    pub fn forward_addrs(&self) -> Vec<SocketAddr> {
        self.forwarders
            .iter()
            .filter_map(|f| f.local_addr())
            .collect()
    }

    /// Total bytes moved by the direct relays.
    pub fn bytes_relayed(&self) -> u64 {
        self.forwarders.iter().map(|f| f.bytes_relayed()).sum()
    }

    /// Currently relayed connections across all direct relays.
    pub fn active_connections(&self) -> u64 {
        self.forwarders
            .iter()
            .map(|f| f.active_connections())
            .sum()
    }

    /// Get connection duration
    pub fn connection_duration(&self) -> Option<Duration> {
        self.connected_at.map(|t| t.elapsed())
    }

    /// Format status for display
    pub async fn status(&self) -> String {
        format!(
            "{}: {:?} | forwards: {} | connections: {} | relayed: {}B",
            self.config.name,
            self.state().await,
            self.config.forwards.len(),
            self.active_connections(),
            self.bytes_relayed()
        )
    }

    async fn start(&mut self) -> Result<(), TunnelError> {
        if self.config.hops.is_empty() {
            // Direct relays: one listener per forward.
            for forward in &self.config.forwards {
                let mut forwarder = PortForwarder::new(forward.clone());
                forwarder.start().await?;
                self.forwarders.push(forwarder);
            }
        } else {
            // The ssh client carries the forwards.
            self.ssh = Some(SshProcess::spawn(&self.config)?);
        }
        Ok(())
    }

    async fn teardown(&mut self) {
        if let Some(mut ssh) = self.ssh.take() {
            ssh.terminate().await;
        }
        for forwarder in &mut self.forwarders {
            forwarder.stop().await;
        }
        self.forwarders.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn spawn_echo() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    while let Ok(n) = socket.read(&mut buf).await {
                        if n == 0 || socket.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        addr
    }

    fn hopless(remote: SocketAddr) -> TunnelConfig {
        TunnelConfig::from_str(&format!(
            r#"
            name = "direct"

            [[forwards]]
            local = "127.0.0.1:0"
            remote_host = "{}"
            remote_port = {}
        "#,
            remote.ip(),
            remote.port()
        ))
        .unwrap()
    }

    #[test]
    fn test_tunnel_state() {
        assert!(TunnelState::Connected.is_connected());
        assert!(!TunnelState::Disconnected.is_connected());
        assert!(TunnelState::Failed.is_failed());
    }

    #[tokio::test]
    async fn test_manager_starts_disconnected() {
        let echo = spawn_echo().await;
        let tunnel = TunnelManager::new(hopless(echo));

        assert_eq!(tunnel.state().await, TunnelState::Disconnected);
        assert!(tunnel.connection_duration().is_none());
    }

    #[tokio::test]
    async fn test_hopless_connect_relays_traffic() {
        let echo = spawn_echo().await;
        let mut tunnel = TunnelManager::new(hopless(echo));

        tunnel.connect().await.unwrap();
        assert!(tunnel.is_connected().await);

        let local = tunnel.forward_addrs()[0];
        let mut client = TcpStream::connect(local).await.unwrap();
        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        tunnel.disconnect().await;
        assert_eq!(tunnel.state().await, TunnelState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_releases_ports() {
        let echo = spawn_echo().await;

        let mut tunnel = TunnelManager::new(hopless(echo));
        tunnel.connect().await.unwrap();
        let local = tunnel.forward_addrs()[0];
        tunnel.disconnect().await;

        // Pin the freed address: a new tunnel on exactly that port must
        // connect, not trip over a stale listener from the first one.
        let config = TunnelConfig::from_str(&format!(
            r#"
            name = "reused"

            [[forwards]]
            local = "{local}"
            remote_host = "{}"
            remote_port = {}
        "#,
            echo.ip(),
            echo.port()
        ))
        .unwrap();

        let mut second = TunnelManager::new(config);
        second.connect().await.unwrap();
        assert_eq!(second.forward_addrs()[0], local);
    }

    #[tokio::test]
    async fn test_double_connect_rejected() {
        let echo = spawn_echo().await;
        let mut tunnel = TunnelManager::new(hopless(echo));

        tunnel.connect().await.unwrap();
        assert!(matches!(
            tunnel.connect().await,
            Err(TunnelError::AlreadyConnected)
        ));
    }

    #[tokio::test]
    async fn test_bind_failure_marks_failed() {
        let echo = spawn_echo().await;

        // Occupy a port, then describe a tunnel that wants exactly it.
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = TunnelConfig::from_str(&format!(
            r#"
            name = "clash"

            [[forwards]]
            local = "{}"
            remote_host = "{}"
            remote_port = {}
        "#,
            taken.local_addr().unwrap(),
            echo.ip(),
            echo.port()
        ))
        .unwrap();

        let mut tunnel = TunnelManager::new(config);
        assert!(tunnel.connect().await.is_err());
        assert!(tunnel.state().await.is_failed());
    }

    #[tokio::test]
    async fn test_status_line_mentions_name() {
        let echo = spawn_echo().await;
        let tunnel = TunnelManager::new(hopless(echo));

        assert!(tunnel.status().await.contains("direct"));
    }
}
