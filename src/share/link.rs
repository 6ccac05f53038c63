//! Single-vault access links.
//!
//! The vault reference travels in the URL fragment, which browsers never send
//! to a server.

use super::backup;
use crate::crypto::encoding::{from_base64url, to_base64url};
use crate::error::AppResult;
use crate::store::VaultReference;
use tracing::debug;

/// Encode one reference as a fragment token.
pub fn encode_access_token(vault: &VaultReference) -> AppResult<String> {
    Ok(to_base64url(&serde_json::to_vec(vault)?))
}

/// Decode a fragment token, accepting it only if it names `expected_id`.
pub fn decode_access_token(fragment: &str, expected_id: &str) -> Option<VaultReference> {
    let token = fragment.trim().trim_start_matches('#');
    if token.is_empty() {
        return None;
    }

    let bytes = from_base64url(token).ok()?;
    let vault: VaultReference = serde_json::from_slice(&bytes).ok()?;

    if !vault.is_well_formed() {
        debug!("Shared vault token is not well formed");
        return None;
    }
    if vault.id != expected_id {
        debug!("Shared vault token names a different vault");
        return None;
    }
    Some(vault)
}

/// `{base}/vault/{id}#{token}`
pub fn share_url(base_url: &str, vault: &VaultReference) -> AppResult<String> {
    Ok(format!(
        "{}/vault/{}#{}",
        base_url.trim_end_matches('/'),
        vault.id,
        encode_access_token(vault)?
    ))
}

/// `{base}/restore#{token}`
pub fn backup_url(base_url: &str, vaults: &[VaultReference]) -> AppResult<String> {
    Ok(format!(
        "{}/restore#{}",
        base_url.trim_end_matches('/'),
        backup::encode(vaults)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::share::backup::BackupContents;
    use crate::store::models::fixtures::vault;

    #[test]
    fn test_share_url_resolves_same_vault() {
        let v = vault("9b2e4c10-aaaa-4bbb-8ccc-123456789abc");
        let url = share_url("https://vault.example/", &v).unwrap();

        let (path, fragment) = url.split_once('#').unwrap();
        assert_eq!(path, format!("https://vault.example/vault/{}", v.id));
        assert_eq!(decode_access_token(fragment, &v.id), Some(v.clone()));
        assert_eq!(decode_access_token(&format!("#{}", fragment), &v.id), Some(v));
    }

    #[test]
    fn test_mismatched_id_does_not_resolve() {
        let v = vault("one");
        let token = encode_access_token(&v).unwrap();
        assert_eq!(decode_access_token(&token, "two"), None);
    }

    #[test]
    fn test_garbage_fragment() {
        assert_eq!(decode_access_token("", "a"), None);
        assert_eq!(decode_access_token("#%%%", "a"), None);
        assert_eq!(decode_access_token("e30", "a"), None);
    }

    #[test]
    fn test_backup_url() {
        let vaults = vec![vault("a"), vault("b")];
        let url = backup_url("http://localhost:3000", &vaults).unwrap();
        let (path, fragment) = url.split_once('#').unwrap();
        assert_eq!(path, "http://localhost:3000/restore");
        assert_eq!(backup::decode(fragment), BackupContents::Vaults(vaults));
    }
}
