//! Local Port Forwarding
//!
//! Direct TCP relays for hopless tunnels: each forward binds a local
//! listener and copies bytes both ways to its remote destination. Used
//! when the path to the destination is already routable (for instance
//! through an established VPN); tunnels with an SSH chain let `ssh -L`
//! do the relaying instead.
//!
//! # Memory Efficiency
//!
//! - Connection cap via semaphore
//! - `copy_bidirectional` relaying, no intermediate queues

use crate::config::ForwardConfig;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default cap on concurrent relayed connections per forward.
const DEFAULT_MAX_CONNECTIONS: usize = 64;

/// Pause after a failed accept so a persistent error (say, fd
/// exhaustion) cannot spin the loop.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// One local listener relaying to one remote destination.
pub struct PortForwarder {
    forward: ForwardConfig,
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicU64>,
    bytes_relayed: Arc<AtomicU64>,
    local_addr: Option<SocketAddr>,
    accept_task: Option<JoinHandle<()>>,
}

impl PortForwarder {
    /// Create a forwarder for one forward entry.
    pub fn new(forward: ForwardConfig) -> Self {
        Self {
            forward,
            semaphore: Arc::new(Semaphore::new(DEFAULT_MAX_CONNECTIONS)),
            active: Arc::new(AtomicU64::new(0)),
            bytes_relayed: Arc::new(AtomicU64::new(0)),
            local_addr: None,
            accept_task: None,
        }
    }

    /// Bind the local listener and start accepting.
    ///
    /// Returns the bound address (useful when the description asked for
    /// port 0).
    pub async fn start(&mut self) -> Result<SocketAddr, ForwardError> {
        let listener = TcpListener::bind(self.forward.local)
            .await
            .map_err(|e| ForwardError::Bind(self.forward.local, e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ForwardError::Bind(self.forward.local, e.to_string()))?;

        self.local_addr = Some(local_addr);

        info!("forwarding {} -> {}", local_addr, self.forward.remote());

        let remote = self.forward.remote();
        let semaphore = self.semaphore.clone();
        let active = self.active.clone();
        let bytes_relayed = self.bytes_relayed.clone();

        self.accept_task = Some(tokio::spawn(async move {
            loop {
                let (inbound, peer) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("accept failed on {}: {}", local_addr, e);
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        debug!("connection cap reached, dropping {}", peer);
                        continue;
                    }
                };

                let remote = remote.clone();
                let active = active.clone();
                let bytes_relayed = bytes_relayed.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    active.fetch_add(1, Ordering::Relaxed);

                    match relay(inbound, &remote).await {
                        Ok(n) => {
                            bytes_relayed.fetch_add(n, Ordering::Relaxed);
                            debug!("relayed {} bytes for {}", n, peer);
                        }
                        Err(e) => debug!("relay for {} ended: {}", peer, e),
                    }

                    active.fetch_sub(1, Ordering::Relaxed);
                });
            }
        }));

        Ok(local_addr)
    }

    /// Stop accepting and release the local port. In-flight relays
    /// finish on their own. When this returns the listener is closed, so
    /// the address can be bound again immediately.
    pub async fn stop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
            let _ = task.await;
        }
        self.local_addr = None;
    }

    /// Currently relayed connections.
    pub fn active_connections(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    /// Total bytes moved in both directions.
    pub fn bytes_relayed(&self) -> u64 {
        self.bytes_relayed.load(Ordering::Relaxed)
    }

    /// Bound local address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

/// Connect to the remote and copy both directions until either side
/// closes. Returns total bytes moved.
async fn relay(mut inbound: TcpStream, remote: &str) -> Result<u64, ForwardError> {
    let mut outbound = TcpStream::connect(remote)
        .await
        .map_err(|e| ForwardError::Connect(remote.to_string(), e.to_string()))?;

    let (up, down) = tokio::io::copy_bidirectional(&mut inbound, &mut outbound)
        .await
        .map_err(|e| ForwardError::Relay(e.to_string()))?;

    Ok(up + down)
}

/// Forwarding errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ForwardError {
    #[error("cannot bind {0}: {1}")]
    Bind(SocketAddr, String),

    #[error("cannot connect to {0}: {1}")]
    Connect(String, String),

    #[error("relay error: {0}")]
    Relay(String),
}
