//! In-process time-lock network.
//!
//! Holds its own release key and attests time with its own clock. The unlock
//! instant is bound into the wrapped token as associated data, so a token
//! cannot be released under an earlier instant than it was wrapped for. The
//! digest is a BLAKE3 hash of the wrapped token.
//!
//! Intended for development and tests; production deployments point
//! [`HttpTimeLockNetwork`](super::HttpTimeLockNetwork) at a real network.

use super::{TimeLockError, TimeLockNetwork, WrappedKey};
use crate::clock::SharedClock;
use crate::crypto::cipher::{decrypt_with_aad, encrypt_with_aad, SymmetricKey};
use crate::crypto::encoding::{from_base64url, to_base64url};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};
use zeroize::Zeroizing;

pub struct LocalTimeLockNetwork {
    release_key: SymmetricKey,
    clock: SharedClock,
    wrap_calls: AtomicUsize,
    unwrap_calls: AtomicUsize,
}

impl LocalTimeLockNetwork {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            release_key: SymmetricKey::generate(),
            clock,
            wrap_calls: AtomicUsize::new(0),
            unwrap_calls: AtomicUsize::new(0),
        }
    }

    pub fn wrap_calls(&self) -> usize {
        self.wrap_calls.load(Ordering::SeqCst)
    }

    pub fn unwrap_calls(&self) -> usize {
        self.unwrap_calls.load(Ordering::SeqCst)
    }

    fn condition(unlock_time: DateTime<Utc>) -> Vec<u8> {
        format!("unlock_at:{}", unlock_time.timestamp_millis()).into_bytes()
    }

    fn digest_of(wrapped_key: &str) -> blake3::Hash {
        blake3::hash(wrapped_key.as_bytes())
    }
}

impl std::fmt::Debug for LocalTimeLockNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTimeLockNetwork")
            .field("wrap_calls", &self.wrap_calls())
            .field("unwrap_calls", &self.unwrap_calls())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TimeLockNetwork for LocalTimeLockNetwork {
    async fn initialize(&self) -> Result<(), TimeLockError> {
        debug!("Local time-lock network ready");
        Ok(())
    }

    async fn wrap(
        &self,
        raw_key: &[u8],
        unlock_time: DateTime<Utc>,
    ) -> Result<WrappedKey, TimeLockError> {
        self.wrap_calls.fetch_add(1, Ordering::SeqCst);

        let sealed = encrypt_with_aad(raw_key, &Self::condition(unlock_time), &self.release_key)
            .map_err(|e| TimeLockError::network(e.to_string()))?;
        let wrapped_key = to_base64url(&sealed);
        let digest = Self::digest_of(&wrapped_key).to_hex().to_string();

        Ok(WrappedKey {
            wrapped_key,
            digest,
        })
    }

    async fn unwrap(
        &self,
        wrapped_key: &str,
        digest: &str,
        unlock_time: DateTime<Utc>,
    ) -> Result<Zeroizing<Vec<u8>>, TimeLockError> {
        self.unwrap_calls.fetch_add(1, Ordering::SeqCst);

        // blake3::Hash equality is constant-time
        let expected = blake3::Hash::from_hex(digest).map_err(|_| TimeLockError::Integrity)?;
        if Self::digest_of(wrapped_key) != expected {
            warn!("Wrapped key digest mismatch");
            return Err(TimeLockError::Integrity);
        }

        if self.clock.now() < unlock_time {
            return Err(TimeLockError::NotYetUnlockable { unlock_time });
        }

        let sealed = from_base64url(wrapped_key).map_err(|_| TimeLockError::Integrity)?;
        decrypt_with_aad(&sealed, &Self::condition(unlock_time), &self.release_key)
            .map_err(|_| TimeLockError::Integrity)
    }
}
