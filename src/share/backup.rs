//! Backup blob: a batch of vault references packed into one URL-safe token.
//!
//! The blob is base64url over a versioned JSON envelope. Decoding never
//! fails with an error; it reports whether a backup was absent, corrupt, or
//! present, so callers can tell "nothing to restore" from "damaged link".

use crate::crypto::encoding::{from_base64url, to_base64url};
use crate::error::AppResult;
use crate::store::models::ids_are_unique;
use crate::store::{VaultReference, VaultStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const BACKUP_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    vaults: &'a [VaultReference],
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    vaults: Vec<VaultReference>,
}

/// Outcome of decoding a backup token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupContents {
    /// No token was supplied.
    Absent,
    /// A token was supplied but does not decode to well-formed references.
    Corrupt(String),
    Vaults(Vec<VaultReference>),
}

impl BackupContents {
    /// Nullable view: `None` for both absent and corrupt input.
    pub fn into_vaults(self) -> Option<Vec<VaultReference>> {
        match self {
            Self::Vaults(vaults) => Some(vaults),
            Self::Absent | Self::Corrupt(_) => None,
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt(_))
    }
}

/// Encode references, in order, into a single token.
pub fn encode(vaults: &[VaultReference]) -> AppResult<String> {
    let json = serde_json::to_vec(&EnvelopeRef {
        version: BACKUP_VERSION,
        vaults,
    })?;
    Ok(to_base64url(&json))
}

pub fn decode(token: &str) -> BackupContents {
    let token = token.trim().trim_start_matches('#');
    if token.is_empty() {
        return BackupContents::Absent;
    }

    let bytes = match from_base64url(token) {
        Ok(bytes) => bytes,
        Err(e) => return corrupt(format!("not base64url: {}", e)),
    };

    let envelope: Envelope = match serde_json::from_slice(&bytes) {
        Ok(envelope) => envelope,
        Err(e) => return corrupt(format!("malformed envelope: {}", e)),
    };

    if envelope.version != BACKUP_VERSION {
        return corrupt(format!("unsupported version {}", envelope.version));
    }
    if let Some(bad) = envelope.vaults.iter().position(|v| !v.is_well_formed()) {
        return corrupt(format!("entry {} is not a well-formed vault", bad));
    }
    if !ids_are_unique(&envelope.vaults) {
        return corrupt("duplicate vault ids".to_string());
    }

    debug!(count = envelope.vaults.len(), "Decoded backup");
    BackupContents::Vaults(envelope.vaults)
}

fn corrupt(reason: String) -> BackupContents {
    warn!("Rejected backup token: {}", reason);
    BackupContents::Corrupt(reason)
}

/// What a restore would do, computed before touching the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestorePlan {
    pub new: Vec<VaultReference>,
    pub existing: Vec<VaultReference>,
}

impl RestorePlan {
    pub fn new_count(&self) -> usize {
        self.new.len()
    }

    pub fn existing_count(&self) -> usize {
        self.existing.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    pub restored: usize,
    pub skipped: usize,
}

/// Split decoded references into those the store lacks and those it has.
pub async fn plan_restore(
    store: &dyn VaultStore,
    vaults: Vec<VaultReference>,
) -> AppResult<RestorePlan> {
    let mut plan = RestorePlan::default();
    for vault in vaults {
        if store.contains(&vault.id).await? {
            plan.existing.push(vault);
        } else {
            plan.new.push(vault);
        }
    }
    Ok(plan)
}

/// Merge references into the store. Existing ids are never overwritten.
pub async fn restore(
    store: &dyn VaultStore,
    vaults: Vec<VaultReference>,
) -> AppResult<RestoreSummary> {
    let plan = plan_restore(store, vaults).await?;
    let mut summary = RestoreSummary {
        restored: 0,
        skipped: plan.existing.len(),
    };

    for vault in &plan.new {
        store.save(vault).await?;
        summary.restored += 1;
    }

    info!(
        restored = summary.restored,
        skipped = summary.skipped,
        "Backup restored"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::fixtures::vault;
    use crate::store::MemoryVaultStore;

    #[test]
    fn test_round_trip_sizes() {
        for vaults in [vec![], vec![vault("a")], vec![vault("a"), vault("b"), vault("c")]] {
            let token = encode(&vaults).unwrap();
            assert_eq!(decode(&token), BackupContents::Vaults(vaults));
        }
    }

    #[test]
    fn test_preserves_order_and_optional_fields() {
        let mut pinned = vault("z");
        pinned.encoded_payload.clear();
        pinned.content_id = Some("bafy".into());
        pinned.name = Some("pinned".into());
        let vaults = vec![pinned, vault("a")];

        let token = encode(&vaults).unwrap();
        assert_eq!(decode(&format!("#{}", token)).into_vaults(), Some(vaults));
    }

    #[test]
    fn test_garbage_is_corrupt_not_panic() {
        for garbage in ["!!!", "bm90IGpzb24", "e30", "eyJ2ZXJzaW9uIjoxfQ", "\u{1F600}"] {
            let decoded = decode(garbage);
            assert!(decoded.is_corrupt(), "{:?} -> {:?}", garbage, decoded);
            assert_eq!(decoded.into_vaults(), None);
        }
    }

    #[test]
    fn test_absent() {
        assert_eq!(decode(""), BackupContents::Absent);
        assert_eq!(decode(" # "), BackupContents::Absent);
        assert_eq!(decode("#").into_vaults(), None);
    }

    #[test]
    fn test_rejects_ill_formed_entries() {
        let mut broken = vault("a");
        broken.wrapped_key.clear();
        let token = encode(&[broken]).unwrap();
        assert!(decode(&token).is_corrupt());

        let token = encode(&[vault("a"), vault("a")]).unwrap();
        assert!(decode(&token).is_corrupt());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let json = serde_json::json!({ "version": 2, "vaults": [] });
        let token = to_base64url(json.to_string().as_bytes());
        assert!(decode(&token).is_corrupt());
    }

    #[tokio::test]
    async fn test_restore_is_merge_only() {
        let store = MemoryVaultStore::new();
        let local = vault("shared");
        store.save(&local).await.unwrap();

        let mut incoming_copy = vault("shared");
        incoming_copy.wrapped_key = "from-backup".into();
        let incoming = vec![incoming_copy, vault("fresh")];

        let plan = plan_restore(&store, incoming.clone()).await.unwrap();
        assert_eq!(plan.new_count(), 1);
        assert_eq!(plan.existing_count(), 1);

        let summary = restore(&store, incoming).await.unwrap();
        assert_eq!(summary, RestoreSummary { restored: 1, skipped: 1 });
        assert_eq!(
            store.get("shared").await.unwrap().unwrap().wrapped_key,
            local.wrapped_key
        );
        assert!(store.contains("fresh").await.unwrap());
    }
}
