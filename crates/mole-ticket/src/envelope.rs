//! Symmetric Envelope
//!
//! Turns an opaque byte blob into tamper-evident, confidential ciphertext
//! and back. The frame layout is:
//!
//! ```text
//! ┌──────────────┬──────────────────────────────┬─────────────┐
//! │ nonce (12 B) │ ciphertext (= plaintext len) │ tag (16 B)  │
//! └──────────────┴──────────────────────────────┴─────────────┘
//! ```
//!
//! ChaCha20-Poly1305 authenticates before it releases any plaintext, so a
//! flipped bit anywhere in the frame surfaces as [`TicketError::Integrity`]
//! and no attacker-controlled bytes are ever decoded. Frames shorter than
//! nonce + tag are rejected up front as [`TicketError::Framing`].
//!
//! The nonce is drawn fresh per seal; two seals of identical plaintext
//! under the same key still produce different frames.

use crate::error::TicketError;
use crate::keystore::SessionKey;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

/// Envelope nonce length in bytes.
pub const ENVELOPE_NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag length in bytes.
pub const ENVELOPE_TAG_SIZE: usize = 16;

/// Seal `plaintext` under `key` with the given fresh nonce.
pub fn seal(
    key: &SessionKey,
    nonce: [u8; ENVELOPE_NONCE_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, TicketError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| TicketError::Sealing)?;

    let mut frame = Vec::with_capacity(ENVELOPE_NONCE_SIZE + ciphertext.len());
    frame.extend_from_slice(&nonce);
    frame.extend_from_slice(&ciphertext);
    Ok(frame)
}

/// Open a sealed frame, verifying integrity before releasing plaintext.
pub fn open(key: &SessionKey, frame: &[u8]) -> Result<Vec<u8>, TicketError> {
    if frame.len() < ENVELOPE_NONCE_SIZE + ENVELOPE_TAG_SIZE {
        return Err(TicketError::Framing);
    }

    let (nonce, ciphertext) = frame.split_at(ENVELOPE_NONCE_SIZE);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| TicketError::Integrity)
}
