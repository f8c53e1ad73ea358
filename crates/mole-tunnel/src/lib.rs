//! mole-tunnel - Tunnel Client
//!
//! Client side of mole: parses declarative tunnel descriptions,
//! authenticates against the companion server with a bearer ticket, and
//! establishes the forwards.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      mole client                         │
//! │                                                          │
//! │  ┌─────────────┐   ┌───────────────┐   ┌─────────────┐   │
//! │  │ TunnelConfig│──▶│ TunnelManager │──▶│ ssh -J/-L   │   │
//! │  │  (TOML)     │   │               │   │ or TCP relay│   │
//! │  └─────────────┘   └───────┬───────┘   └─────────────┘   │
//! │                            │                             │
//! │  ┌─────────────┐           │                             │
//! │  │  ApiClient  │◀──────────┘  X-Mole-Ticket header       │
//! │  └──────┬──────┘                                         │
//! └─────────│────────────────────────────────────────────────┘
//!           ▼ HTTP
//!   companion server (tickets, tunnel definitions)
//! ```

mod api;
mod config;
mod forward;
mod manager;
mod ssh;

pub use api::{ApiClient, ApiError, TICKET_HEADER};
pub use config::{ApiConfig, ForwardConfig, HopConfig, TunnelConfig, TunnelConfigError};
pub use forward::{ForwardError, PortForwarder};
pub use manager::{TunnelError, TunnelManager, TunnelState};
pub use ssh::{ssh_args, SshError, SshProcess};
