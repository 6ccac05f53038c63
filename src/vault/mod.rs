//! Vault lifecycle: commitment (draft, then arm) and unlock.

pub mod commit;
pub mod draft;
pub mod unlock;
pub mod watch;

pub use commit::{CommitState, VaultCommitment};
pub use draft::{DraftRequest, DraftSummary, UnlockPreset, VaultDraft, VaultSettings};
pub use unlock::{UnlockState, VaultUnlock};
pub use watch::spawn_unlock_watch;
