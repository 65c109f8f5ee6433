//! Shared session-key cell.
//!
//! The session token is the only state mutated outside its owning component
//! and read from several tasks at once (the send path and both channel
//! decoders). `SessionContext` publishes the derived HMAC key as a single
//! swappable `Arc`, so readers always observe either the previous key or
//! the new one, never a partial update.

use std::sync::Arc;

use parking_lot::RwLock;
use ring::hmac;

use crate::seal::signing_key;

#[derive(Default)]
pub struct SessionContext {
    key: RwLock<Option<Arc<hmac::Key>>>,
}

impl SessionContext {
    /// A context with no key installed (pre-auth).
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or rotate the signing key derived from `token`.
    pub fn install(&self, token: &[u8]) {
        *self.key.write() = Some(Arc::new(signing_key(token)));
    }

    /// Drop the key; subsequent frames go back to the unsigned fallback.
    pub fn clear(&self) {
        *self.key.write() = None;
    }

    /// The currently published key, if any.
    pub fn current(&self) -> Option<Arc<hmac::Key>> {
        self.key.read().clone()
    }

    pub fn is_established(&self) -> bool {
        self.key.read().is_some()
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("established", &self.is_established())
            .finish()
    }
}
