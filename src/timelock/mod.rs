//! Time-lock key release.
//!
//! A raw vault key is wrapped by an external condition-release network under
//! an unlock instant. The network, not the caller, attests the current time:
//! before the unlock instant every `unwrap` fails for every caller, the
//! vault's creator included. There is no privileged unwrap path.
//!
//! [`TimeLockClient::is_unlockable`] is only a local clock pre-check used to
//! avoid network calls that would certainly fail. It is never the authority.

pub mod http;
pub mod local;

use crate::clock::SharedClock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub use http::HttpTimeLockNetwork;
pub use local::LocalTimeLockNetwork;

/// Failures reported by the time-lock network.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimeLockError {
    #[error("Vault cannot be unlocked before {unlock_time}")]
    NotYetUnlockable { unlock_time: DateTime<Utc> },

    #[error("Time-lock network error: {0}")]
    Network(String),

    #[error("Wrapped key failed integrity verification")]
    Integrity,
}

impl TimeLockError {
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }
}

/// Opaque wrap result. Both tokens are cleared when dropped.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct WrappedKey {
    pub wrapped_key: String,
    pub digest: String,
}

impl std::fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappedKey")
            .field("wrapped_key_len", &self.wrapped_key.len())
            .field("digest", &self.digest)
            .finish()
    }
}

/// Condition-release network capability.
#[async_trait]
pub trait TimeLockNetwork: Send + Sync {
    /// Connect or warm up. Called once before the first wrap/unwrap.
    async fn initialize(&self) -> Result<(), TimeLockError>;

    /// Wrap `raw_key` so it can only be released at or after `unlock_time`.
    async fn wrap(
        &self,
        raw_key: &[u8],
        unlock_time: DateTime<Utc>,
    ) -> Result<WrappedKey, TimeLockError>;

    /// Release the raw key, if the network attests `unlock_time` has passed.
    async fn unwrap(
        &self,
        wrapped_key: &str,
        digest: &str,
        unlock_time: DateTime<Utc>,
    ) -> Result<Zeroizing<Vec<u8>>, TimeLockError>;
}

/// Shared network handle.
pub type SharedTimeLockNetwork = Arc<dyn TimeLockNetwork>;

/// Client used by the vault state machines.
pub struct TimeLockClient {
    network: SharedTimeLockNetwork,
    clock: SharedClock,
    initialized: OnceCell<()>,
}

impl std::fmt::Debug for TimeLockClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeLockClient")
            .field("initialized", &self.initialized.initialized())
            .finish_non_exhaustive()
    }
}

impl TimeLockClient {
    pub fn new(network: SharedTimeLockNetwork, clock: SharedClock) -> Self {
        Self {
            network,
            clock,
            initialized: OnceCell::new(),
        }
    }

    async fn ensure_initialized(&self) -> Result<(), TimeLockError> {
        self.initialized
            .get_or_try_init(|| async {
                debug!("Initializing time-lock network");
                self.network.initialize().await
            })
            .await
            .map(|_| ())
    }

    pub async fn wrap(
        &self,
        raw_key: &[u8],
        unlock_time: DateTime<Utc>,
    ) -> Result<WrappedKey, TimeLockError> {
        self.ensure_initialized().await?;
        debug!(%unlock_time, "Wrapping vault key under time condition");
        self.network.wrap(raw_key, unlock_time).await
    }

    pub async fn unwrap(
        &self,
        wrapped_key: &str,
        digest: &str,
        unlock_time: DateTime<Utc>,
    ) -> Result<Zeroizing<Vec<u8>>, TimeLockError> {
        self.ensure_initialized().await?;
        debug!(%unlock_time, "Requesting key release");
        self.network.unwrap(wrapped_key, digest, unlock_time).await
    }

    /// Local, conservative pre-check: `now >= unlock_time` on this device's clock.
    pub fn is_unlockable(&self, unlock_time: DateTime<Utc>) -> bool {
        self.clock.now() >= unlock_time
    }

    /// Time left until `unlock_time` on the local clock, zero once passed.
    pub fn time_remaining(&self, unlock_time: DateTime<Utc>) -> Duration {
        (unlock_time - self.clock.now()).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }
}
