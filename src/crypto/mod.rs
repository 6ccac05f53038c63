//! Local cryptography: symmetric payload encryption and the URL-safe codec.
//!
//! Nothing in here performs I/O. Keys and decrypted buffers are wrapped in
//! zeroizing types so they are cleared when dropped.

pub mod cipher;
pub mod encoding;

pub use cipher::{
    decrypt, decrypt_to_string, encrypt, wipe, CryptoError, CryptoResult, SymmetricKey, KEY_LEN,
};
pub use encoding::{from_base64url, to_base64url, EncodingError};
