use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashSet;
use std::time::Duration;

/// Durable, shareable description of a time-locked vault.
///
/// Holds only the wrapped key and the ciphertext (inline or by content id);
/// never the raw key or the plaintext. Instants are kept at millisecond
/// precision so every encoding of a reference compares equal after decoding.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultReference {
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub unlock_time: DateTime<Utc>,
    pub wrapped_key: String,
    pub wrapped_key_digest: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Base64url ciphertext; empty when the payload is pinned by `content_id`.
    #[serde(default)]
    pub encoded_payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    pub destroy_after_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl VaultReference {
    /// Structural check applied to references arriving from outside the store.
    pub fn is_well_formed(&self) -> bool {
        !self.id.trim().is_empty()
            && !self.wrapped_key.is_empty()
            && !self.wrapped_key_digest.is_empty()
            && (!self.encoded_payload.is_empty()
                || self.content_id.as_deref().is_some_and(|cid| !cid.is_empty()))
    }

    /// Name shown to the user, falling back to a short form of the id.
    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Vault {}", self.short_id()),
        }
    }

    /// First 8 characters of the id, used in labels and logs.
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    pub fn is_inline(&self) -> bool {
        self.content_id.is_none()
    }

    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.unlock_time - now).to_std().unwrap_or(Duration::ZERO)
    }
}

impl std::fmt::Debug for VaultReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultReference")
            .field("id", &self.id)
            .field("unlock_time", &self.unlock_time)
            .field("created_at", &self.created_at)
            .field("payload_len", &self.encoded_payload.len())
            .field("content_id", &self.content_id)
            .field("destroy_after_read", &self.destroy_after_read)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// True when no two references share an id.
pub fn ids_are_unique(vaults: &[VaultReference]) -> bool {
    let mut seen = HashSet::with_capacity(vaults.len());
    vaults.iter().all(|v| seen.insert(v.id.as_str()))
}

/// Row shape of the `vaults` table. Instants are stored as epoch milliseconds.
#[derive(Debug, Clone, FromRow)]
pub struct VaultRow {
    pub id: String,
    pub unlock_time: i64,
    pub wrapped_key: String,
    pub wrapped_key_digest: String,
    pub created_at: i64,
    pub encoded_payload: String,
    pub content_id: Option<String>,
    pub destroy_after_read: bool,
    pub name: Option<String>,
}

impl From<VaultRow> for VaultReference {
    fn from(row: VaultRow) -> Self {
        Self {
            id: row.id,
            unlock_time: DateTime::from_timestamp_millis(row.unlock_time).unwrap_or_default(),
            wrapped_key: row.wrapped_key,
            wrapped_key_digest: row.wrapped_key_digest,
            created_at: DateTime::from_timestamp_millis(row.created_at).unwrap_or_default(),
            encoded_payload: row.encoded_payload,
            content_id: row.content_id,
            destroy_after_read: row.destroy_after_read,
            name: row.name,
        }
    }
}
