use crate::clock::truncate_to_millis;
use crate::crypto::{encrypt, to_base64url, wipe, SymmetricKey};
use crate::error::AppResult;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Tunables for vault creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSettings {
    /// Ciphertexts up to this size ride inline in the share link.
    pub inline_threshold_bytes: usize,
    /// Largest secret accepted, in bytes.
    pub max_secret_bytes: usize,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            inline_threshold_bytes: 8 * 1024,
            max_secret_bytes: 1024 * 1024,
        }
    }
}

/// Common unlock delays offered to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockPreset {
    OneHour,
    OneDay,
    OneWeek,
    ThirtyDays,
}

impl UnlockPreset {
    pub const ALL: [UnlockPreset; 4] = [
        Self::OneHour,
        Self::OneDay,
        Self::OneWeek,
        Self::ThirtyDays,
    ];

    pub fn duration(&self) -> Duration {
        match self {
            Self::OneHour => Duration::hours(1),
            Self::OneDay => Duration::days(1),
            Self::OneWeek => Duration::days(7),
            Self::ThirtyDays => Duration::days(30),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OneHour => "1 hour",
            Self::OneDay => "24 hours",
            Self::OneWeek => "7 days",
            Self::ThirtyDays => "30 days",
        }
    }

    pub fn unlock_time_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.duration()
    }
}

/// Input to draft creation.
pub struct DraftRequest {
    pub(crate) secret: Zeroizing<String>,
    pub(crate) unlock_time: DateTime<Utc>,
    pub(crate) destroy_after_read: bool,
    pub(crate) name: Option<String>,
    pub(crate) captcha_token: Option<String>,
}

impl DraftRequest {
    pub fn new(secret: impl Into<String>, unlock_time: DateTime<Utc>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
            unlock_time,
            destroy_after_read: false,
            name: None,
            captcha_token: None,
        }
    }

    pub fn destroy_after_read(mut self, destroy: bool) -> Self {
        self.destroy_after_read = destroy;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = Some(name.trim().to_string()).filter(|n| !n.is_empty());
        self
    }

    /// Token passed to the pinning network when the payload is too large to inline.
    pub fn captcha_token(mut self, token: impl Into<String>) -> Self {
        self.captcha_token = Some(token.into());
        self
    }

    pub fn unlock_time(&self) -> DateTime<Utc> {
        self.unlock_time
    }
}

impl std::fmt::Debug for DraftRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftRequest")
            .field("secret_len", &self.secret.len())
            .field("unlock_time", &self.unlock_time)
            .field("destroy_after_read", &self.destroy_after_read)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Encrypted vault that has not been armed yet.
///
/// Holds the raw key, so it lives only in memory and its byte fields are
/// zeroed on drop and on every explicit exit.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct VaultDraft {
    #[zeroize(skip)]
    unlock_time: DateTime<Utc>,
    #[zeroize(skip)]
    destroy_after_read: bool,
    #[zeroize(skip)]
    name: Option<String>,
    #[zeroize(skip)]
    captcha_token: Option<String>,
    raw_key: Vec<u8>,
    encrypted_payload: Vec<u8>,
    encoded_payload: String,
}

impl VaultDraft {
    /// Generate a fresh key and encrypt the request's secret under it.
    pub fn seal(request: &DraftRequest) -> AppResult<Self> {
        let key = SymmetricKey::generate();
        let encrypted_payload = encrypt(request.secret.as_bytes(), &key)?;
        let encoded_payload = to_base64url(&encrypted_payload);

        Ok(Self {
            unlock_time: truncate_to_millis(request.unlock_time),
            destroy_after_read: request.destroy_after_read,
            name: request.name.clone(),
            captcha_token: request.captcha_token.clone(),
            raw_key: key.export().to_vec(),
            encrypted_payload,
            encoded_payload,
        })
    }

    /// Zero every byte field in place. Lengths are kept so the result can be
    /// inspected; the encoded text is cleared.
    pub fn wipe(&mut self) {
        wipe(&mut self.raw_key);
        wipe(&mut self.encrypted_payload);
        self.encoded_payload.zeroize();
    }

    pub fn is_wiped(&self) -> bool {
        self.raw_key.iter().all(|b| *b == 0)
            && self.encrypted_payload.iter().all(|b| *b == 0)
            && self.encoded_payload.is_empty()
    }

    pub fn unlock_time(&self) -> DateTime<Utc> {
        self.unlock_time
    }

    pub fn destroy_after_read(&self) -> bool {
        self.destroy_after_read
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn captcha_token(&self) -> Option<&str> {
        self.captcha_token.as_deref()
    }

    pub fn raw_key(&self) -> &[u8] {
        &self.raw_key
    }

    pub fn encrypted_payload(&self) -> &[u8] {
        &self.encrypted_payload
    }

    pub fn encoded_payload(&self) -> &str {
        &self.encoded_payload
    }

    pub fn summary(&self) -> DraftSummary {
        DraftSummary {
            unlock_time: self.unlock_time,
            destroy_after_read: self.destroy_after_read,
            name: self.name.clone(),
            payload_bytes: self.encrypted_payload.len(),
        }
    }
}

impl std::fmt::Debug for VaultDraft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultDraft")
            .field("unlock_time", &self.unlock_time)
            .field("destroy_after_read", &self.destroy_after_read)
            .field("name", &self.name)
            .field("payload_bytes", &self.encrypted_payload.len())
            .finish_non_exhaustive()
    }
}

/// Non-secret view of a draft for review screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftSummary {
    pub unlock_time: DateTime<Utc>,
    pub destroy_after_read: bool,
    pub name: Option<String>,
    pub payload_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{decrypt_to_string, from_base64url, KEY_LEN};

    fn request() -> DraftRequest {
        DraftRequest::new("hello", Utc::now() + Duration::hours(1))
    }

    #[test]
    fn test_seal_encrypts_under_fresh_key() {
        let draft = VaultDraft::seal(&request()).unwrap();
        assert_eq!(draft.raw_key().len(), KEY_LEN);
        assert!(!draft.encoded_payload().contains("hello"));

        let key = SymmetricKey::import(draft.raw_key()).unwrap();
        let sealed = from_base64url(draft.encoded_payload()).unwrap();
        assert_eq!(sealed, draft.encrypted_payload());
        assert_eq!(decrypt_to_string(&sealed, &key).unwrap().as_str(), "hello");

        let other = VaultDraft::seal(&request()).unwrap();
        assert_ne!(draft.raw_key(), other.raw_key());
    }

    #[test]
    fn test_wipe_zeroes_all_bytes() {
        let mut draft = VaultDraft::seal(&request()).unwrap();
        let key_len = draft.raw_key().len();
        let payload_len = draft.encrypted_payload().len();
        assert!(!draft.is_wiped());

        draft.wipe();

        assert!(draft.is_wiped());
        assert_eq!(draft.raw_key(), vec![0u8; key_len].as_slice());
        assert_eq!(draft.encrypted_payload(), vec![0u8; payload_len].as_slice());
        assert_eq!(draft.encoded_payload(), "");
    }

    #[test]
    fn test_unlock_time_truncated_to_millis() {
        let t = DateTime::from_timestamp(1_900_000_000, 987_654_321).unwrap();
        let draft = VaultDraft::seal(&DraftRequest::new("x", t)).unwrap();
        assert_eq!(draft.unlock_time().timestamp_subsec_nanos(), 987_000_000);
    }

    #[test]
    fn test_request_builder() {
        let req = request().destroy_after_read(true).named("  ").captcha_token("tok");
        assert!(req.destroy_after_read);
        assert_eq!(req.name, None);
        assert_eq!(req.captcha_token.as_deref(), Some("tok"));
        assert!(!format!("{:?}", req).contains("hello"));

        let req = request().named(" Letter ");
        assert_eq!(req.name.as_deref(), Some("Letter"));
    }

    #[test]
    fn test_presets() {
        let now = Utc::now();
        assert_eq!(UnlockPreset::OneHour.unlock_time_from(now), now + Duration::hours(1));
        assert_eq!(UnlockPreset::ThirtyDays.duration(), Duration::days(30));
        assert_eq!(UnlockPreset::ALL.len(), 4);
        assert_eq!(UnlockPreset::OneWeek.label(), "7 days");
    }
}
