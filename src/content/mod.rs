//! Content-pinning network.
//!
//! Ciphertexts too large to ride inline in a share link are pinned to an
//! IPFS-style network and fetched back through public gateways. Only
//! ciphertext ever crosses this boundary.

pub mod gateway;
pub mod memory;
pub mod pinata;
pub mod upload;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use gateway::GatewayFetcher;
pub use memory::MemoryContentNetwork;
pub use pinata::PinataClient;
pub use upload::{RemoteContentNetwork, UploadApiClient};

/// Public gateways tried in order when fetching pinned content.
pub const DEFAULT_GATEWAYS: &[&str] = &[
    "https://gateway.pinata.cloud/ipfs",
    "https://w3s.link/ipfs",
    "https://dweb.link/ipfs",
    "https://cloudflare-ipfs.com/ipfs",
    "https://ipfs.io/ipfs",
];

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Failed to fetch {cid}: {reason}")]
    Fetch { cid: String, reason: String },

    #[error("Pinning service is not configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Client-side view of the pinning network.
#[async_trait]
pub trait ContentNetwork: Send + Sync {
    /// Pin `data` and return its content id.
    async fn upload(&self, data: &[u8], captcha_token: &str) -> Result<String, ContentError>;

    async fn fetch(&self, cid: &str) -> Result<Vec<u8>, ContentError>;

    /// Best-effort removal. Returns whether content was actually unpinned;
    /// failures are logged, never returned.
    async fn unpin(&self, cid: &str) -> bool;
}

pub type SharedContentNetwork = Arc<dyn ContentNetwork>;

/// Server-side pinning backend holding the service credentials.
#[async_trait]
pub trait PinService: Send + Sync {
    async fn pin(&self, data: Vec<u8>) -> Result<String, ContentError>;

    /// Best-effort, as for [`ContentNetwork::unpin`].
    async fn unpin(&self, cid: &str) -> bool;
}

pub type SharedPinService = Arc<dyn PinService>;

/// Content ids are path segments; reject anything that could escape one.
pub fn is_valid_cid(cid: &str) -> bool {
    !cid.is_empty() && cid.len() <= 128 && cid.chars().all(|c| c.is_ascii_alphanumeric())
}
