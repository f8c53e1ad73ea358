//! Session Key Store
//!
//! Holds the process-wide symmetric secret that every outstanding ticket
//! is sealed under. Rotating the key is the bulk kill switch: tickets
//! sealed under the previous key immediately fail verification.
//!
//! # Deployment Note
//!
//! The session key is generated at startup and never persisted. Restarting
//! the ticket-issuing process therefore invalidates every outstanding
//! ticket. This is deliberate: there is no key file to steal and no stale
//! key to rotate out of a backup.
//!
//! # Concurrency
//!
//! Readers take a snapshot (`Arc<SessionKey>`) under a briefly-held read
//! lock, so grant/verify/load run in parallel. `rotate` takes the write
//! lock only to swap the snapshot; an in-flight operation keeps using the
//! generation it started with.

use rand::{rngs::OsRng, CryptoRng, RngCore};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

/// Session key length in bytes (ChaCha20-Poly1305).
pub const SESSION_KEY_SIZE: usize = 32;

/// A single generation of the session secret.
#[derive(Clone)]
pub struct SessionKey([u8; SESSION_KEY_SIZE]);

impl SessionKey {
    /// Raw key bytes, for the envelope cipher only.
    pub(crate) fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey([redacted])")
    }
}

/// Source of the session key and of all nonce material.
///
/// The random source is injected at construction so tests can run fully
/// deterministic; production code uses the OS CSPRNG.
pub struct KeyStore {
    /// Injected CSPRNG, serialized behind its own lock.
    rng: Mutex<Box<dyn RngCore + Send>>,
    /// Current key generation, snapshot-swapped on rotation.
    current: RwLock<Arc<SessionKey>>,
}

impl KeyStore {
    /// Create a key store backed by the OS random source.
    pub fn new() -> Self {
        Self::with_rng(OsRng)
    }

    /// Create a key store with an injected random source.
    ///
    /// The `CryptoRng` bound keeps non-cryptographic generators out of
    /// production call sites; tests inject a seeded `StdRng`.
    pub fn with_rng<R>(mut rng: R) -> Self
    where
        R: RngCore + CryptoRng + Send + 'static,
    {
        let mut key = [0u8; SESSION_KEY_SIZE];
        rng.fill_bytes(&mut key);

        Self {
            rng: Mutex::new(Box::new(rng)),
            current: RwLock::new(Arc::new(SessionKey(key))),
        }
    }

    /// Snapshot of the current key generation.
    pub fn current(&self) -> Arc<SessionKey> {
        self.current.read().expect("keystore lock poisoned").clone()
    }

    /// Replace the session key with a fresh one.
    ///
    /// Every ticket sealed under the previous key fails `verify`/`load`
    /// from this point on. Intended as a rare administrative action.
    pub fn rotate(&self) {
        let mut key = [0u8; SESSION_KEY_SIZE];
        self.fill_bytes(&mut key);

        *self.current.write().expect("keystore lock poisoned") = Arc::new(SessionKey(key));
    }

    /// Fill `buf` from the injected CSPRNG.
    pub fn fill_bytes(&self, buf: &mut [u8]) {
        self.rng
            .lock()
            .expect("keystore rng lock poisoned")
            .fill_bytes(buf);
    }
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}
