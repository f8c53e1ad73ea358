//! Ticket Errors
//!
//! Failure taxonomy shared by the envelope, the codec, and the service.
//! Every decode path fails closed: no field of a ticket is trusted until
//! the envelope has authenticated and the payload has decoded cleanly.
//!
//! The HTTP boundary collapses all of these to a generic 401/403 so a
//! caller cannot probe *why* a ticket was rejected; the specific kind is
//! only visible in local debug logging.

use std::net::IpAddr;

/// Errors produced while issuing or checking tickets.
///
/// None of the display strings carry key material, passwords, or ticket
/// contents.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TicketError {
    /// The ticket string is not a well-formed envelope frame (bad base64,
    /// or shorter than a nonce plus an authentication tag).
    #[error("ticket frame is truncated or not decodable")]
    Framing,

    /// Envelope authentication failed: the ticket was tampered with,
    /// corrupted, or sealed under a rotated-away session key.
    #[error("ticket failed integrity verification")]
    Integrity,

    /// The envelope opened but the payload is not a valid ticket record.
    #[error("ticket payload is malformed")]
    Malformed,

    /// The caller's address is not in the ticket's authorized IP list.
    #[error("address {0} is not authorized by this ticket")]
    InvalidIp(IpAddr),

    /// The ticket's expiry is in the past.
    #[error("ticket expired at {0}")]
    Expired(u64),

    /// Issuance rejects empty usernames.
    #[error("cannot issue a ticket for an empty user")]
    EmptyUser,

    /// Sealing failed inside the AEAD. Not reachable for payloads of
    /// ticket size; kept so the seal path never panics.
    #[error("envelope seal failed")]
    Sealing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_distinguishes_kinds_without_material() {
        // Local logs need to tell the kinds apart, but the dataless
        // variants must stay fixed strings with no frame or key content.
        let displays = [
            TicketError::Framing.to_string(),
            TicketError::Integrity.to_string(),
            TicketError::Malformed.to_string(),
            TicketError::EmptyUser.to_string(),
            TicketError::Sealing.to_string(),
        ];

        let unique: std::collections::HashSet<&str> =
            displays.iter().map(String::as_str).collect();
        assert_eq!(unique.len(), displays.len());

        for display in &displays {
            assert!(!display.is_empty());
            assert!(!display.contains("key"));
            assert!(!display.contains('='));
        }
    }

    #[test]
    fn test_invalid_ip_names_address() {
        let err = TicketError::InvalidIp("10.0.0.1".parse().unwrap());
        assert!(err.to_string().contains("10.0.0.1"));
    }
}
