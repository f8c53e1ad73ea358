//! Ticket Record and Codec
//!
//! The ticket payload that goes inside the envelope: user, authorized IP
//! list, expiry, and an anti-collision nonce. Serialized as compact JSON
//! with one-letter field names to keep the sealed frame small:
//!
//! ```text
//! {"u":"jb","a":["10.2.3.4"],"e":1000,"n":[...8 bytes...]}
//! ```
//!
//! The 8-byte nonce is redrawn on every serialization so two tickets with
//! identical claims never seal to comparable ciphertext.

use crate::error::TicketError;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Upper bound on the authorized IP list.
pub const MAX_AUTHORIZED_IPS: usize = 4;

/// Length of the per-ticket anti-collision nonce.
pub const TICKET_NONCE_SIZE: usize = 8;

/// Bounded most-recently-used list of authorized addresses.
///
/// As a client roams (NAT rebind, Wi-Fi handoff) each newly observed
/// address is inserted at the most-recent slot; re-observing a known
/// address moves it there instead of duplicating it. At capacity the
/// least-recently-used address is evicted. Index 0 is always the LRU end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IpList(Vec<IpAddr>);

impl IpList {
    /// List containing a single address.
    pub fn single(ip: IpAddr) -> Self {
        Self(vec![ip])
    }

    /// Record `ip` as most recently used, evicting the LRU entry if full.
    pub fn insert(&mut self, ip: IpAddr) {
        if let Some(pos) = self.0.iter().position(|known| *known == ip) {
            self.0.remove(pos);
        } else if self.0.len() >= MAX_AUTHORIZED_IPS {
            self.0.remove(0);
        }
        self.0.push(ip);
    }

    /// Is `ip` authorized by this list?
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.0.contains(ip)
    }

    /// Addresses in LRU-to-MRU order.
    pub fn as_slice(&self) -> &[IpAddr] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The authenticated claim carried by a ticket string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Authenticated principal. Never empty once issued.
    #[serde(rename = "u")]
    pub user: String,

    /// Addresses this ticket is valid from.
    #[serde(rename = "a")]
    pub ips: IpList,

    /// Absolute UNIX expiry (seconds). Valid while `expires_at >= now`.
    #[serde(rename = "e")]
    pub expires_at: u64,

    /// Anti-collision nonce, redrawn on every serialization.
    #[serde(rename = "n")]
    pub nonce: [u8; TICKET_NONCE_SIZE],
}

impl Ticket {
    /// Serialize to the byte blob handed to the envelope.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TicketError> {
        serde_json::to_vec(self).map_err(|_| TicketError::Malformed)
    }

    /// Decode and structurally validate a payload blob.
    ///
    /// Rejects anything a validly issued ticket cannot be: undecodable
    /// JSON, a wrong-length nonce, an empty user, an empty or oversized
    /// IP list.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TicketError> {
        let ticket: Ticket = serde_json::from_slice(bytes).map_err(|_| TicketError::Malformed)?;

        if ticket.user.is_empty()
            || ticket.ips.is_empty()
            || ticket.ips.len() > MAX_AUTHORIZED_IPS
        {
            return Err(TicketError::Malformed);
        }

        Ok(ticket)
    }

    /// Restricted projection for the inspection endpoint.
    pub fn info(&self) -> TicketInfo {
        TicketInfo {
            user: self.user.clone(),
            authorized_ips: self.ips.as_slice().to_vec(),
            expires_at: self.expires_at,
        }
    }
}

/// What the inspection endpoint exposes: nothing beyond these three
/// fields, so internal or future payload fields can never leak.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketInfo {
    pub user: String,
    pub authorized_ips: Vec<IpAddr>,
    pub expires_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn sample() -> Ticket {
        Ticket {
            user: "jb".into(),
            ips: IpList::single(ip("10.2.3.4")),
            expires_at: 1000,
            nonce: [1, 2, 3, 4, 5, 6, 7, 8],
        }
    }

    #[test]
    fn test_codec_round_trip() {
        let ticket = sample();
        let bytes = ticket.to_bytes().unwrap();
        let decoded = Ticket::from_bytes(&bytes).unwrap();

        assert_eq!(decoded, ticket);
    }

    #[test]
    fn test_compact_field_names() {
        let bytes = sample().to_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();

        for field in ["\"u\"", "\"a\"", "\"e\"", "\"n\""] {
            assert!(text.contains(field), "missing {field} in {text}");
        }
    }

    #[test]
    fn test_mru_reinsert_moves_to_recent_slot() {
        let mut ips = IpList::single(ip("10.0.0.1"));
        ips.insert(ip("10.0.0.2"));
        ips.insert(ip("10.0.0.3"));

        // [a, b, c] + a => [b, c, a]
        ips.insert(ip("10.0.0.1"));
        assert_eq!(
            ips.as_slice(),
            &[ip("10.0.0.2"), ip("10.0.0.3"), ip("10.0.0.1")]
        );
    }

    #[test]
    fn test_mru_eviction_at_capacity() {
        let mut ips = IpList::single(ip("10.0.0.1"));
        for n in 2..=4 {
            ips.insert(ip(&format!("10.0.0.{n}")));
        }
        assert_eq!(ips.len(), MAX_AUTHORIZED_IPS);

        // Full list: the oldest entry is dropped for the newcomer.
        ips.insert(ip("10.0.0.5"));
        assert_eq!(ips.len(), MAX_AUTHORIZED_IPS);
        assert!(!ips.contains(&ip("10.0.0.1")));
        assert_eq!(
            ips.as_slice(),
            &[ip("10.0.0.2"), ip("10.0.0.3"), ip("10.0.0.4"), ip("10.0.0.5")]
        );
    }

    #[test]
    fn test_mru_handles_ipv6() {
        let mut ips = IpList::single(ip("10.0.0.1"));
        ips.insert(ip("::1"));

        assert!(ips.contains(&ip("::1")));
        assert!(ips.contains(&ip("10.0.0.1")));
    }

    #[test]
    fn test_truncated_payload_is_malformed() {
        let bytes = sample().to_bytes().unwrap();
        let truncated = &bytes[..bytes.len() / 2];

        assert_eq!(Ticket::from_bytes(truncated), Err(TicketError::Malformed));
    }

    #[test]
    fn test_garbage_payload_is_malformed() {
        assert_eq!(
            Ticket::from_bytes(&[0xff, 0x00, 0x42]),
            Err(TicketError::Malformed)
        );
    }

    #[test]
    fn test_wrong_nonce_length_is_malformed() {
        let short_nonce = br#"{"u":"jb","a":["10.2.3.4"],"e":1000,"n":[1,2,3]}"#;
        assert_eq!(
            Ticket::from_bytes(short_nonce),
            Err(TicketError::Malformed)
        );
    }

    #[test]
    fn test_empty_ip_list_is_malformed() {
        let no_ips = br#"{"u":"jb","a":[],"e":1000,"n":[1,2,3,4,5,6,7,8]}"#;
        assert_eq!(Ticket::from_bytes(no_ips), Err(TicketError::Malformed));
    }

    #[test]
    fn test_empty_user_is_malformed() {
        let no_user = br#"{"u":"","a":["10.2.3.4"],"e":1000,"n":[1,2,3,4,5,6,7,8]}"#;
        assert_eq!(Ticket::from_bytes(no_user), Err(TicketError::Malformed));
    }

    #[test]
    fn test_info_hides_nonce() {
        let info = sample().info();
        let rendered = serde_json::to_string(&info).unwrap();

        assert!(rendered.contains("jb"));
        assert!(rendered.contains("10.2.3.4"));
        assert!(!rendered.contains("nonce"));
        assert!(!rendered.contains("\"n\":"));
    }
}
