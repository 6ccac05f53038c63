//! Two-phase vault creation: an editable draft, then a single irreversible arm.
//!
//! ```text
//! form -> encrypting -> draft -> arming -> (committed | draft)
//! ```
//!
//! `form`, `draft` and `committed` are the resting states; a new draft may be
//! started from `form` or `committed`. Arming wraps the raw key
//! with the time-lock network, persists the reference, and only then wipes
//! the draft, so a failure anywhere before persistence leaves the draft
//! intact for a retry or a discard.

use super::draft::{DraftRequest, DraftSummary, VaultDraft, VaultSettings};
use crate::clock::truncate_to_millis;
use crate::content::SharedContentNetwork;
use crate::error::{AppError, AppResult};
use crate::store::{SharedVaultStore, VaultReference};
use crate::timelock::TimeLockClient;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitState {
    Form,
    Encrypting,
    Draft,
    Arming,
    Committed,
}

impl CommitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Form => "form",
            Self::Encrypting => "encrypting",
            Self::Draft => "draft",
            Self::Arming => "arming",
            Self::Committed => "committed",
        }
    }
}

struct CommitInner {
    state: CommitState,
    draft: Option<VaultDraft>,
    discard_requested: bool,
    last_error: Option<String>,
    /// `is_wiped()` of every draft retired by this machine, in order.
    #[cfg(test)]
    retired: Vec<bool>,
}

/// Zero a draft that is leaving the machine.
fn retire_draft(inner: &mut CommitInner, mut draft: VaultDraft) {
    draft.wipe();
    #[cfg(test)]
    inner.retired.push(draft.is_wiped());
    #[cfg(not(test))]
    let _ = inner;
}

/// Commitment state machine. One instance owns at most one draft.
pub struct VaultCommitment {
    timelock: Arc<TimeLockClient>,
    store: SharedVaultStore,
    content: Option<SharedContentNetwork>,
    settings: VaultSettings,
    inner: Mutex<CommitInner>,
}

impl std::fmt::Debug for VaultCommitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultCommitment")
            .field("state", &self.state())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl VaultCommitment {
    pub fn new(timelock: Arc<TimeLockClient>, store: SharedVaultStore) -> Self {
        Self {
            timelock,
            store,
            content: None,
            settings: VaultSettings::default(),
            inner: Mutex::new(CommitInner {
                state: CommitState::Form,
                draft: None,
                discard_requested: false,
                last_error: None,
                #[cfg(test)]
                retired: Vec::new(),
            }),
        }
    }

    /// Enable pinning for payloads above the inline threshold.
    pub fn with_content_network(mut self, content: SharedContentNetwork) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_settings(mut self, settings: VaultSettings) -> Self {
        self.settings = settings;
        self
    }

    fn lock(&self) -> MutexGuard<'_, CommitInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> CommitState {
        self.lock().state
    }

    /// User-presentable message for the last failed action, if any.
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn draft_summary(&self) -> Option<DraftSummary> {
        self.lock().draft.as_ref().map(VaultDraft::summary)
    }

    fn record<T>(&self, result: AppResult<T>) -> AppResult<T> {
        let mut inner = self.lock();
        match &result {
            Ok(_) => inner.last_error = None,
            Err(e) => inner.last_error = Some(e.user_message()),
        }
        result
    }

    /// Encrypt a secret into a new draft. No network calls.
    pub async fn create_draft(&self, request: DraftRequest) -> AppResult<DraftSummary> {
        let result = self.create_draft_inner(request).await;
        self.record(result)
    }

    async fn create_draft_inner(&self, request: DraftRequest) -> AppResult<DraftSummary> {
        {
            let mut inner = self.lock();
            match inner.state {
                CommitState::Form | CommitState::Committed => {}
                CommitState::Draft => {
                    return Err(AppError::InvalidTransition {
                        state: "draft",
                        action: "create a new draft",
                    })
                }
                CommitState::Encrypting | CommitState::Arming => {
                    return Err(AppError::AlreadyInProgress)
                }
            }
            self.validate(&request)?;
            inner.state = CommitState::Encrypting;
            inner.discard_requested = false;
        }

        let _guard = EncryptingGuard { commit: self };
        let draft = tokio::task::spawn_blocking(move || VaultDraft::seal(&request))
            .await
            .map_err(|e| AppError::internal(format!("Encryption task failed: {}", e)))??;

        if draft.encrypted_payload().len() > self.settings.inline_threshold_bytes {
            if self.content.is_none() {
                return Err(AppError::validation(
                    "This secret is too large to share inline. Try a shorter secret.",
                ));
            }
            if draft.captcha_token().is_none() {
                return Err(AppError::validation("CAPTCHA token required"));
            }
        }

        let mut inner = self.lock();
        if inner.discard_requested {
            inner.discard_requested = false;
            inner.state = CommitState::Form;
            retire_draft(&mut inner, draft);
            return Err(AppError::Discarded);
        }

        let summary = draft.summary();
        debug!(payload_bytes = summary.payload_bytes, "Draft created");
        inner.draft = Some(draft);
        inner.state = CommitState::Draft;
        Ok(summary)
    }

    fn validate(&self, request: &DraftRequest) -> AppResult<()> {
        if request.secret.trim().is_empty() {
            return Err(AppError::validation("Secret cannot be empty"));
        }
        if request.secret.len() > self.settings.max_secret_bytes {
            return Err(AppError::PayloadTooLarge {
                max_bytes: self.settings.max_secret_bytes,
            });
        }
        let now = self.timelock.clock().now();
        if truncate_to_millis(request.unlock_time) <= now {
            return Err(AppError::validation("Unlock time must be in the future"));
        }
        Ok(())
    }

    /// Throw the draft away.
    ///
    /// While arming, the discard is recorded and honored once the in-flight
    /// wrap or save returns; nothing from that arm stays persisted. From
    /// `committed` it simply returns to `form`.
    pub fn discard(&self) {
        let mut inner = self.lock();
        match inner.state {
            CommitState::Form => {}
            CommitState::Committed => {
                inner.state = CommitState::Form;
                inner.last_error = None;
            }
            CommitState::Encrypting | CommitState::Arming => {
                debug!(state = inner.state.as_str(), "Discard requested mid-flight");
                inner.discard_requested = true;
            }
            CommitState::Draft => {
                if let Some(draft) = inner.draft.take() {
                    retire_draft(&mut inner, draft);
                }
                inner.state = CommitState::Form;
                inner.last_error = None;
                info!("Draft discarded");
            }
        }
    }

    /// Commit the draft: wrap the key, persist the reference, wipe the draft.
    pub async fn arm(&self) -> AppResult<VaultReference> {
        let guard = match self.begin_arming() {
            Ok(guard) => guard,
            Err(e) => return self.record(Err(e)),
        };

        match self.commit_draft(&guard).await {
            Ok(vault) => {
                guard.finish();
                info!(
                    vault_id = %vault.short_id(),
                    inline = vault.is_inline(),
                    unlock_time = %vault.unlock_time,
                    "Vault armed"
                );
                self.record(Ok(vault))
            }
            Err(e) => {
                drop(guard);
                warn!(error = %e, "Arming failed");
                self.record(Err(e))
            }
        }
    }

    fn begin_arming(&self) -> AppResult<ArmingGuard<'_>> {
        let mut inner = self.lock();
        match inner.state {
            CommitState::Draft => {}
            CommitState::Encrypting | CommitState::Arming => {
                return Err(AppError::AlreadyInProgress)
            }
            CommitState::Form | CommitState::Committed => {
                return Err(AppError::InvalidTransition {
                    state: inner.state.as_str(),
                    action: "arm",
                })
            }
        }

        let Some(draft) = inner.draft.take() else {
            inner.state = CommitState::Form;
            return Err(AppError::InvalidTransition {
                state: "form",
                action: "arm",
            });
        };
        inner.state = CommitState::Arming;
        inner.discard_requested = false;

        Ok(ArmingGuard {
            commit: self,
            draft: Some(draft),
        })
    }

    fn discard_requested(&self) -> bool {
        self.lock().discard_requested
    }

    async fn commit_draft(&self, guard: &ArmingGuard<'_>) -> AppResult<VaultReference> {
        let draft = guard.draft()?;

        let content_id = if draft.encrypted_payload().len() > self.settings.inline_threshold_bytes {
            let content = self.content.as_ref().ok_or_else(|| {
                AppError::validation("This secret is too large to share inline. Try a shorter secret.")
            })?;
            let token = draft.captcha_token().unwrap_or_default();
            let cid = content.upload(draft.encrypted_payload(), token).await?;
            debug!(cid = %cid, "Payload pinned");
            Some(cid)
        } else {
            None
        };

        let wrapped = match self.timelock.wrap(draft.raw_key(), draft.unlock_time()).await {
            Ok(wrapped) => wrapped,
            Err(e) => {
                self.release_upload(content_id.as_deref()).await;
                return Err(e.into());
            }
        };

        if self.discard_requested() {
            drop(wrapped);
            self.release_upload(content_id.as_deref()).await;
            return Err(AppError::Discarded);
        }

        let inline = content_id.is_none();
        let mut vault = VaultReference {
            id: Uuid::new_v4().to_string(),
            unlock_time: draft.unlock_time(),
            wrapped_key: wrapped.wrapped_key.clone(),
            wrapped_key_digest: wrapped.digest.clone(),
            created_at: truncate_to_millis(self.timelock.clock().now()),
            encoded_payload: if inline {
                draft.encoded_payload().to_string()
            } else {
                String::new()
            },
            content_id,
            destroy_after_read: draft.destroy_after_read(),
            name: draft.name().map(str::to_string),
        };
        drop(wrapped);

        if let Err(e) = self.store.save(&vault).await {
            // The wrap is tied to this attempt's id; a retry wraps afresh.
            vault.wrapped_key.zeroize();
            vault.wrapped_key_digest.zeroize();
            self.release_upload(vault.content_id.as_deref()).await;
            return Err(match e {
                AppError::Persistence(_) => e,
                other => AppError::persistence(other.to_string()),
            });
        }

        if self.discard_requested() {
            match self.store.delete(&vault.id).await {
                Ok(_) => {
                    vault.wrapped_key.zeroize();
                    vault.wrapped_key_digest.zeroize();
                    self.release_upload(vault.content_id.as_deref()).await;
                    return Err(AppError::Discarded);
                }
                Err(e) => {
                    // Persisted and cannot be withdrawn, so the arm stands
                    warn!(vault_id = %vault.short_id(), error = %e, "Discard arrived after save");
                }
            }
        }

        Ok(vault)
    }

    async fn release_upload(&self, cid: Option<&str>) {
        if let (Some(cid), Some(content)) = (cid, self.content.as_ref()) {
            if !content.unpin(cid).await {
                debug!(cid, "Orphaned upload left for garbage collection");
            }
        }
    }
}

/// Reverts `encrypting` to `form` if draft creation is abandoned.
struct EncryptingGuard<'a> {
    commit: &'a VaultCommitment,
}

impl Drop for EncryptingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.commit.lock();
        if inner.state == CommitState::Encrypting {
            inner.state = CommitState::Form;
            inner.discard_requested = false;
        }
    }
}

/// Owns the draft while arming. Dropping it without [`ArmingGuard::finish`]
/// hands the draft back (state `draft`), or wipes it if a discard arrived.
struct ArmingGuard<'a> {
    commit: &'a VaultCommitment,
    draft: Option<VaultDraft>,
}

impl ArmingGuard<'_> {
    fn draft(&self) -> AppResult<&VaultDraft> {
        self.draft
            .as_ref()
            .ok_or_else(|| AppError::internal("Draft missing while arming"))
    }

    /// Persistence succeeded: wipe the draft and settle in `committed`.
    fn finish(mut self) {
        let mut inner = self.commit.lock();
        if let Some(draft) = self.draft.take() {
            retire_draft(&mut inner, draft);
        }
        inner.state = CommitState::Committed;
        inner.discard_requested = false;
    }
}

impl Drop for ArmingGuard<'_> {
    fn drop(&mut self) {
        let Some(draft) = self.draft.take() else {
            return;
        };
        let mut inner = self.commit.lock();
        if inner.discard_requested {
            retire_draft(&mut inner, draft);
            inner.state = CommitState::Form;
            inner.discard_requested = false;
            info!("Draft discarded after arming was interrupted");
        } else {
            inner.draft = Some(draft);
            inner.state = CommitState::Draft;
        }
    }
}
