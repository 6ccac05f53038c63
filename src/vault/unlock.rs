//! Turning a vault reference back into plaintext.
//!
//! ```text
//! loading -> (not_found | locked | ready) -> unlocking -> (unlocked | destroyed | error)
//! ```
//!
//! `locked` and `ready` are decided by the local clock pre-check only. The
//! network's `unwrap` is the authority; a `ready` vault can still be refused.

use crate::content::{ContentError, SharedContentNetwork};
use crate::crypto::{decrypt_to_string, from_base64url, SymmetricKey};
use crate::error::{AppError, AppResult};
use crate::share::decode_access_token;
use crate::store::{SharedVaultStore, VaultReference};
use crate::timelock::{TimeLockClient, TimeLockError};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockState {
    Loading,
    NotFound,
    Locked,
    Ready,
    Unlocking,
    Unlocked,
    Destroyed,
    Error,
}

impl UnlockState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::NotFound => "not_found",
            Self::Locked => "locked",
            Self::Ready => "ready",
            Self::Unlocking => "unlocking",
            Self::Unlocked => "unlocked",
            Self::Destroyed => "destroyed",
            Self::Error => "error",
        }
    }

    /// No further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NotFound | Self::Destroyed)
    }
}

struct UnlockInner {
    state: UnlockState,
    vault: Option<VaultReference>,
    plaintext: Option<Zeroizing<String>>,
    error: Option<String>,
}

impl Default for UnlockInner {
    fn default() -> Self {
        Self {
            state: UnlockState::Loading,
            vault: None,
            plaintext: None,
            error: None,
        }
    }
}

/// Unlock state machine for a single vault.
pub struct VaultUnlock {
    timelock: Arc<TimeLockClient>,
    store: SharedVaultStore,
    content: Option<SharedContentNetwork>,
    inner: Mutex<UnlockInner>,
}

impl std::fmt::Debug for VaultUnlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultUnlock")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl VaultUnlock {
    pub fn new(timelock: Arc<TimeLockClient>, store: SharedVaultStore) -> Self {
        Self {
            timelock,
            store,
            content: None,
            inner: Mutex::new(UnlockInner::default()),
        }
    }

    /// Needed to read vaults whose payload is pinned rather than inline.
    pub fn with_content_network(mut self, content: SharedContentNetwork) -> Self {
        self.content = Some(content);
        self
    }

    fn lock(&self) -> MutexGuard<'_, UnlockInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> UnlockState {
        self.lock().state
    }

    pub fn vault(&self) -> Option<VaultReference> {
        self.lock().vault.clone()
    }

    pub fn plaintext(&self) -> Option<Zeroizing<String>> {
        self.lock().plaintext.clone()
    }

    pub fn error_message(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// Local countdown to the unlock time; `None` until a vault is loaded.
    pub fn time_remaining(&self) -> Option<Duration> {
        let unlock_time = self.lock().vault.as_ref()?.unlock_time;
        Some(self.timelock.time_remaining(unlock_time))
    }

    /// Resolve vault `id` from the local store, falling back to a shared
    /// access token carried in `fragment`. The local copy wins when both exist.
    pub async fn load(&self, id: &str, fragment: Option<&str>) -> AppResult<UnlockState> {
        {
            let mut inner = self.lock();
            if inner.state == UnlockState::Unlocking {
                return Err(AppError::AlreadyInProgress);
            }
            *inner = UnlockInner::default();
        }

        let local = match self.store.get(id).await {
            Ok(local) => local,
            Err(e) => {
                warn!(error = %e, "Local vault lookup failed, trying shared link");
                None
            }
        };
        let shared = fragment.and_then(|f| decode_access_token(f, id));

        let vault = match (local, shared) {
            (Some(local), Some(shared)) => {
                if local.unlock_time != shared.unlock_time
                    || local.encoded_payload != shared.encoded_payload
                    || local.content_id != shared.content_id
                {
                    warn!(
                        vault_id = %local.short_id(),
                        "Shared link disagrees with local vault, using local copy"
                    );
                }
                Some(local)
            }
            (Some(local), None) => Some(local),
            (None, shared) => shared,
        };

        let mut inner = self.lock();
        let state = match &vault {
            None => {
                debug!("Vault not found");
                UnlockState::NotFound
            }
            Some(v) if self.timelock.is_unlockable(v.unlock_time) => UnlockState::Ready,
            Some(_) => UnlockState::Locked,
        };
        inner.state = state;
        inner.vault = vault;
        Ok(state)
    }

    /// Re-run the local pre-check: `locked` becomes `ready` once the local
    /// clock passes the unlock time. Returns the current state.
    pub fn refresh(&self) -> UnlockState {
        let mut inner = self.lock();
        let passed = inner
            .vault
            .as_ref()
            .is_some_and(|v| self.timelock.is_unlockable(v.unlock_time));
        if inner.state == UnlockState::Locked && passed {
            debug!("Vault ready");
            inner.state = UnlockState::Ready;
        }
        inner.state
    }

    /// Leave `error` for `locked`/`ready` so the user can try again.
    pub fn retry(&self) -> UnlockState {
        let mut inner = self.lock();
        if inner.state == UnlockState::Error {
            inner.error = None;
            inner.state = UnlockState::Locked;
            drop(inner);
            return self.refresh();
        }
        inner.state
    }

    /// Release the key, decrypt the payload, and apply destroy-after-read.
    pub async fn unlock(&self) -> AppResult<Zeroizing<String>> {
        let vault = {
            let mut inner = self.lock();
            match inner.state {
                UnlockState::Ready | UnlockState::Error => {}
                UnlockState::Locked => {
                    let unlock_time = inner.vault.as_ref().map(|v| v.unlock_time);
                    match unlock_time {
                        Some(t) if self.timelock.is_unlockable(t) => {}
                        Some(unlock_time) => {
                            // Certain to fail; don't bother the network
                            return Err(TimeLockError::NotYetUnlockable { unlock_time }.into());
                        }
                        None => return Err(AppError::NotFound),
                    }
                }
                UnlockState::Unlocking => return Err(AppError::AlreadyInProgress),
                UnlockState::Unlocked => {
                    if let Some(plaintext) = inner.plaintext.clone() {
                        return Ok(plaintext);
                    }
                }
                UnlockState::Loading | UnlockState::NotFound => return Err(AppError::NotFound),
                UnlockState::Destroyed => {
                    return Err(AppError::InvalidTransition {
                        state: "destroyed",
                        action: "unlock",
                    })
                }
            }
            let Some(vault) = inner.vault.clone() else {
                return Err(AppError::NotFound);
            };
            inner.state = UnlockState::Unlocking;
            inner.error = None;
            vault
        };

        let _guard = UnlockingGuard { unlock: self };

        let plaintext = match self.recover_plaintext(&vault).await {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!(vault_id = %vault.short_id(), error = %e, "Unlock failed");
                self.fail(&e);
                return Err(e);
            }
        };

        if !vault.destroy_after_read {
            let mut inner = self.lock();
            inner.plaintext = Some(plaintext.clone());
            inner.state = UnlockState::Unlocked;
            info!(vault_id = %vault.short_id(), "Vault unlocked");
            return Ok(plaintext);
        }

        // Delete before revealing, so a restart cannot read it again
        if let Err(e) = self.store.delete(&vault.id).await {
            drop(plaintext);
            let e = match e {
                AppError::Persistence(_) => e,
                other => AppError::persistence(other.to_string()),
            };
            warn!(vault_id = %vault.short_id(), error = %e, "Destroy-after-read delete failed");
            self.fail(&e);
            return Err(e);
        }

        {
            let mut inner = self.lock();
            inner.plaintext = Some(plaintext.clone());
            inner.state = UnlockState::Destroyed;
        }
        info!(vault_id = %vault.short_id(), "Vault unlocked and destroyed");

        if let (Some(cid), Some(content)) = (vault.content_id.as_deref(), self.content.as_ref()) {
            if !content.unpin(cid).await {
                debug!(cid, "Pinned payload not unpinned");
            }
        }

        Ok(plaintext)
    }

    async fn recover_plaintext(&self, vault: &VaultReference) -> AppResult<Zeroizing<String>> {
        let raw_key = self
            .timelock
            .unwrap(&vault.wrapped_key, &vault.wrapped_key_digest, vault.unlock_time)
            .await?;

        let sealed = match vault.content_id.as_deref() {
            Some(cid) => {
                let content = self.content.as_ref().ok_or(ContentError::NotConfigured)?;
                content.fetch(cid).await?
            }
            None => from_base64url(&vault.encoded_payload)?,
        };

        let key = SymmetricKey::import(&raw_key)?;
        Ok(decrypt_to_string(&sealed, &key)?)
    }

    fn fail(&self, error: &AppError) {
        let mut inner = self.lock();
        inner.plaintext = None;
        inner.state = UnlockState::Error;
        inner.error = Some(error.user_message());
    }

    /// Drop any recovered plaintext and forget the vault.
    pub fn teardown(&self) {
        *self.lock() = UnlockInner::default();
    }
}

/// Puts `unlocking` back to `ready` if the unlock future is dropped mid-flight.
struct UnlockingGuard<'a> {
    unlock: &'a VaultUnlock,
}

impl Drop for UnlockingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.unlock.lock();
        if inner.state == UnlockState::Unlocking {
            inner.state = UnlockState::Ready;
        }
    }
}
