//! URL-safe text encoding for binary payloads.
//!
//! Unpadded base64url (`-`/`_` alphabet). Decoding tolerates trailing `=`
//! padding and surrounding whitespace so links copied from other tools still
//! resolve.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("Invalid URL-safe base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Encode bytes as URL-safe text.
pub fn to_base64url(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode text produced by [`to_base64url`].
pub fn from_base64url(text: &str) -> Result<Vec<u8>, EncodingError> {
    let trimmed = text.trim().trim_end_matches('=');
    Ok(URL_SAFE_NO_PAD.decode(trimmed)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_roundtrip() {
        assert_eq!(to_base64url(&[]), "");
        assert!(from_base64url("").unwrap().is_empty());
    }

    #[test]
    fn test_url_safe_alphabet() {
        let encoded = to_base64url(&[0xfb, 0xff, 0xbf]);
        assert_eq!(encoded, "-_-_");
        assert!(!encoded.contains('+') && !encoded.contains('/') && !encoded.contains('='));
    }

    #[test]
    fn test_padding_tolerated() {
        assert_eq!(from_base64url("aGk=").unwrap(), b"hi");
        assert_eq!(from_base64url(" aGk \n").unwrap(), b"hi");
    }

    #[test]
    fn test_invalid_input_rejected() {
        assert!(from_base64url("not base64!").is_err());
        assert!(from_base64url("a").is_err());
    }

    #[test]
    fn test_large_payload_roundtrip() {
        let data: Vec<u8> = (0..1024 * 1024).map(|i| (i % 251) as u8).collect();
        assert_eq!(from_base64url(&to_base64url(&data)).unwrap(), data);
    }

    proptest! {
        #[test]
        fn prop_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            prop_assert_eq!(from_base64url(&to_base64url(&data)).unwrap(), data);
        }
    }
}
