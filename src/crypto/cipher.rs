//! Symmetric encryption for vault payloads.
//!
//! Uses ChaCha20-Poly1305 with a fresh random 96-bit nonce per message.
//! Sealed layout: `nonce (12 bytes) || ciphertext || tag`.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Raw key length in bytes.
pub const KEY_LEN: usize = 32;

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Ciphertext is truncated")]
    TruncatedCiphertext,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed - invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Decrypted payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// A 256-bit symmetric key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Export the raw key bytes. The caller owns wiping the copy.
    pub fn export(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.0.to_vec())
    }

    /// Import a key from raw bytes.
    pub fn import(raw: &[u8]) -> CryptoResult<Self> {
        if raw.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength(raw.len()));
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(raw);
        Ok(Self(bytes))
    }

    fn cipher(&self) -> CryptoResult<ChaCha20Poly1305> {
        ChaCha20Poly1305::new_from_slice(&self.0).map_err(|_| CryptoError::EncryptionFailed)
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// Encrypt a payload under `key`.
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey) -> CryptoResult<Vec<u8>> {
    encrypt_with_aad(plaintext, &[], key)
}

/// Encrypt a payload, binding `aad` as associated data.
pub fn encrypt_with_aad(plaintext: &[u8], aad: &[u8], key: &SymmetricKey) -> CryptoResult<Vec<u8>> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = key
        .cipher()?
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt a payload produced by [`encrypt`].
pub fn decrypt(sealed: &[u8], key: &SymmetricKey) -> CryptoResult<Zeroizing<Vec<u8>>> {
    decrypt_with_aad(sealed, &[], key)
}

/// Decrypt a payload produced by [`encrypt_with_aad`] with the same `aad`.
pub fn decrypt_with_aad(
    sealed: &[u8],
    aad: &[u8],
    key: &SymmetricKey,
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    if sealed.len() < NONCE_LEN {
        return Err(CryptoError::TruncatedCiphertext);
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    key.cipher()?
        .decrypt(nonce, Payload { msg: ciphertext, aad })
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Decrypt a payload and interpret it as UTF-8 text.
pub fn decrypt_to_string(sealed: &[u8], key: &SymmetricKey) -> CryptoResult<Zeroizing<String>> {
    let mut bytes = decrypt(sealed, key)?;
    match String::from_utf8(std::mem::take(&mut *bytes)) {
        Ok(text) => Ok(Zeroizing::new(text)),
        Err(err) => {
            err.into_bytes().zeroize();
            Err(CryptoError::InvalidUtf8)
        }
    }
}

/// Overwrite a buffer with zeros.
///
/// Best-effort: this clears the live buffer but cannot reach copies the
/// allocator or OS may have made. It is not a cryptographic erasure guarantee.
pub fn wipe(buf: &mut [u8]) {
    buf.zeroize();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = SymmetricKey::generate();
        let sealed = encrypt(b"hello", &key).unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + 5 + 16);

        let text = decrypt_to_string(&sealed, &key).unwrap();
        assert_eq!(text.as_str(), "hello");
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = encrypt(b"hello", &SymmetricKey::generate()).unwrap();
        let err = decrypt(&sealed, &SymmetricKey::generate()).unwrap_err();
        assert!(matches!(err, CryptoError::DecryptionFailed));
    }

    #[test]
    fn test_aad_is_bound() {
        let key = SymmetricKey::generate();
        let sealed = encrypt_with_aad(b"key material", b"1700000000000", &key).unwrap();
        assert!(decrypt_with_aad(&sealed, b"1700000000000", &key).is_ok());
        assert!(decrypt_with_aad(&sealed, b"1600000000000", &key).is_err());
    }

    #[test]
    fn test_export_import() {
        let key = SymmetricKey::generate();
        let raw = key.export();
        assert_eq!(raw.len(), KEY_LEN);

        let imported = SymmetricKey::import(&raw).unwrap();
        let sealed = encrypt(b"payload", &key).unwrap();
        assert_eq!(decrypt(&sealed, &imported).unwrap().as_slice(), b"payload");

        assert!(matches!(
            SymmetricKey::import(&raw[..16]),
            Err(CryptoError::InvalidKeyLength(16))
        ));
    }

    #[test]
    fn test_truncated_ciphertext() {
        let key = SymmetricKey::generate();
        assert!(matches!(
            decrypt(&[1, 2, 3], &key),
            Err(CryptoError::TruncatedCiphertext)
        ));
    }

    #[test]
    fn test_non_utf8_plaintext_rejected() {
        let key = SymmetricKey::generate();
        let sealed = encrypt(&[0xff, 0xfe, 0xfd], &key).unwrap();
        assert!(matches!(
            decrypt_to_string(&sealed, &key),
            Err(CryptoError::InvalidUtf8)
        ));
    }

    #[test]
    fn test_wipe_zeroes_buffer() {
        let mut buf = vec![7u8; 32];
        wipe(&mut buf);
        assert_eq!(buf.len(), 32);
        assert!(buf.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = SymmetricKey::generate();
        assert_eq!(format!("{:?}", key), "SymmetricKey(<redacted>)");
    }
}
