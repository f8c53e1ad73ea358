//! mole-ticket - Short-Lived Access Tickets
//!
//! Issues and verifies the bearer tickets that authenticate mole clients
//! against the companion server. A ticket binds a user to the IP addresses
//! it was observed from and to an absolute expiry time, and is sealed under
//! a process-wide symmetric session key.
//!
//! # Ticket Lifecycle
//!
//! ```text
//! ┌─────────┐  grant   ┌────────────┐  seal    ┌──────────────┐
//! │  user + │─────────▶│   Ticket   │─────────▶│ base64 frame │
//! │ ip, exp │          │ (payload)  │  AEAD    │ (the ticket) │
//! └─────────┘          └────────────┘          └──────┬───────┘
//!                                                     │
//!                   verify / load / refresh           ▼
//!                ┌────────────────────────────────────────┐
//!                │ open envelope → decode → IP + expiry   │
//!                └────────────────────────────────────────┘
//! ```
//!
//! # Security
//!
//! - ChaCha20-Poly1305 authenticated encryption; any tampering fails closed
//! - Tickets are IP-bound: valid only from addresses they were issued to
//! - Rotating the session key invalidates every outstanding ticket at once
//! - The session key lives in memory only; a restart revokes all tickets

mod envelope;
mod error;
mod keystore;
mod service;
mod ticket;

pub use envelope::{ENVELOPE_NONCE_SIZE, ENVELOPE_TAG_SIZE};
pub use error::TicketError;
pub use keystore::{KeyStore, SessionKey, SESSION_KEY_SIZE};
pub use service::TicketService;
pub use ticket::{IpList, Ticket, TicketInfo, MAX_AUTHORIZED_IPS, TICKET_NONCE_SIZE};
