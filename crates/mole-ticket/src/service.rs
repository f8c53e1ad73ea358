//! Ticket Service
//!
//! The externally consumed authentication protocol: `grant` issues a
//! ticket string, `verify` checks one against a caller address and clock,
//! `load` exposes the decoded record for refresh and inspection, and
//! `rotate` invalidates everything issued so far.
//!
//! All operations are pure CPU-bound transforms over a snapshot of the
//! session key; they never block on I/O and run concurrently with each
//! other. The service is cheap to clone and share.
//!
//! # Refresh Policy
//!
//! `refresh` extends a session without a password, but only while the
//! prior ticket is still unexpired. An expired ticket must go back
//! through password authentication.

use crate::envelope::{self, ENVELOPE_NONCE_SIZE};
use crate::error::TicketError;
use crate::keystore::KeyStore;
use crate::ticket::{IpList, Ticket, TICKET_NONCE_SIZE};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::net::IpAddr;
use std::sync::Arc;

/// Issues, verifies, and refreshes ticket strings.
#[derive(Clone)]
pub struct TicketService {
    keys: Arc<KeyStore>,
}

impl TicketService {
    /// Create a service around an explicit key store.
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self { keys }
    }

    /// Issue a ticket for `user`, valid from `ip` until `expires_at`.
    pub fn grant(&self, user: &str, ip: IpAddr, expires_at: u64) -> Result<String, TicketError> {
        if user.is_empty() {
            return Err(TicketError::EmptyUser);
        }

        let ticket = Ticket {
            user: user.to_string(),
            ips: IpList::single(ip),
            expires_at,
            nonce: [0u8; TICKET_NONCE_SIZE],
        };

        self.seal(ticket)
    }

    /// Check a ticket string against the caller's address and clock.
    ///
    /// Returns the authenticated user. Fails closed on any envelope or
    /// codec error; checks IP membership before expiry.
    pub fn verify(&self, ticket: &str, ip: IpAddr, now: u64) -> Result<String, TicketError> {
        let ticket = self.load(ticket)?;

        if !ticket.ips.contains(&ip) {
            return Err(TicketError::InvalidIp(ip));
        }
        if ticket.expires_at < now {
            return Err(TicketError::Expired(ticket.expires_at));
        }

        Ok(ticket.user)
    }

    /// Decode a ticket string without IP or expiry checks.
    ///
    /// The envelope must still authenticate and the payload must decode;
    /// only the per-call IP and clock checks are skipped. Used by the
    /// refresh path and the inspection endpoint.
    pub fn load(&self, ticket: &str) -> Result<Ticket, TicketError> {
        let frame = BASE64.decode(ticket).map_err(|_| TicketError::Framing)?;
        let payload = envelope::open(&self.keys.current(), &frame)?;
        Ticket::from_bytes(&payload)
    }

    /// Re-issue a still-valid ticket with `ip` merged in and a new expiry.
    ///
    /// The observed address enters the MRU list (possibly evicting the
    /// least-recently-used one) and the payload is re-sealed under a
    /// fresh nonce. Expired tickets are refused.
    pub fn refresh(
        &self,
        ticket: &str,
        ip: IpAddr,
        expires_at: u64,
        now: u64,
    ) -> Result<String, TicketError> {
        let mut ticket = self.load(ticket)?;

        if ticket.expires_at < now {
            return Err(TicketError::Expired(ticket.expires_at));
        }

        ticket.ips.insert(ip);
        ticket.expires_at = expires_at;

        self.seal(ticket)
    }

    /// Rotate the session key, invalidating every outstanding ticket.
    pub fn rotate(&self) {
        self.keys.rotate();
    }

    /// Redraw the payload nonce, seal, and base64-encode.
    fn seal(&self, mut ticket: Ticket) -> Result<String, TicketError> {
        self.keys.fill_bytes(&mut ticket.nonce);
        let payload = ticket.to_bytes()?;

        let mut envelope_nonce = [0u8; ENVELOPE_NONCE_SIZE];
        self.keys.fill_bytes(&mut envelope_nonce);

        let frame = envelope::seal(&self.keys.current(), envelope_nonce, &payload)?;
        Ok(BASE64.encode(frame))
    }
}
