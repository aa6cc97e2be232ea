//! Salted one-way client identities.
//!
//! Raw client identifiers (typically IPs) never leave this module; everything
//! downstream works with an opaque handle. The derivation is deliberately
//! slow (Argon2id, one pass, 64 MiB, four lanes, 32-byte output) so stored
//! handles cannot feasibly be brute-forced back to raw identifiers, and it is
//! memoized for the life of the process.
//!
//! Rotating the salt silently severs the correspondence between previously
//! stored handles and future ones. That is an operational invariant, not a
//! bug: the ledger simply starts attributing interactions to fresh handles.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use thiserror::Error;
use tracing::trace;

const SOURCE: &str = "identity";

const ARGON2_PASSES: u32 = 1;
const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
const ARGON2_LANES: u32 = 4;
const HANDLE_LEN: usize = 32;
// argon2 refuses salts shorter than this.
const MIN_SALT_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid hashing parameters: {0}")]
    Params(String),
    #[error("handle is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Deterministic, salted, memoized mapping from raw client ids to handles.
#[derive(Debug)]
pub struct HashIdentity {
    hasher: Argon2<'static>,
    salt: Vec<u8>,
    /// One cell per raw id. The map lock is only ever held for lookups and
    /// cell insertion; derivation happens on the cell, outside it.
    memo: RwLock<HashMap<String, Arc<OnceLock<String>>>>,
    #[cfg(test)]
    derivations: std::sync::atomic::AtomicUsize,
}

impl HashIdentity {
    pub fn new(salt: impl Into<Vec<u8>>) -> Result<Self, IdentityError> {
        let salt = salt.into();
        if salt.len() < MIN_SALT_LEN {
            return Err(IdentityError::Params(format!(
                "salt must be at least {MIN_SALT_LEN} bytes, got {}",
                salt.len()
            )));
        }

        let params = Params::new(
            ARGON2_MEMORY_KIB,
            ARGON2_PASSES,
            ARGON2_LANES,
            Some(HANDLE_LEN),
        )
        .map_err(|err| IdentityError::Params(err.to_string()))?;

        Ok(Self {
            hasher: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            salt,
            memo: RwLock::new(HashMap::new()),
            #[cfg(test)]
            derivations: std::sync::atomic::AtomicUsize::new(0),
        })
    }

    /// Return the handle for `raw_id`, computing and memoizing it on first
    /// use. Concurrent first calls for the same id compute the hash exactly
    /// once; callers for other ids never wait on an in-flight derivation.
    pub fn handle(&self, raw_id: &str) -> String {
        let cell = {
            let memo = crate::cache::lock::rw_read(&self.memo, SOURCE, "handle");
            memo.get(raw_id).cloned()
        };
        let cell = match cell {
            Some(cell) => cell,
            None => {
                let mut memo = crate::cache::lock::rw_write(&self.memo, SOURCE, "handle");
                memo.entry(raw_id.to_string())
                    .or_insert_with(|| Arc::new(OnceLock::new()))
                    .clone()
            }
        };

        cell.get_or_init(|| {
            let handle = self.derive(raw_id);
            trace!(target = "brezza::identity", handle = %handle, "derived client handle");
            handle
        })
        .clone()
    }

    fn derive(&self, raw_id: &str) -> String {
        #[cfg(test)]
        self.derivations
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let mut out = [0u8; HANDLE_LEN];
        // The output buffer length matches the configured params and the
        // constructor enforces the salt minimum, so derivation cannot fail.
        self.hasher
            .hash_password_into(raw_id.as_bytes(), &self.salt, &mut out)
            .unwrap_or_default();
        STANDARD_NO_PAD.encode(out)
    }

    /// Decode a handle back into its raw 32 bytes for storage.
    pub fn decode_handle(handle: &str) -> Result<Vec<u8>, IdentityError> {
        Ok(STANDARD_NO_PAD.decode(handle)?)
    }

    /// Encode stored handle bytes back into the in-memory representation.
    pub fn encode_handle(bytes: &[u8]) -> String {
        STANDARD_NO_PAD.encode(bytes)
    }
}
