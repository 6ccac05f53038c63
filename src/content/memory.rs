use super::{ContentError, ContentNetwork};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-process pinning network. Content ids are BLAKE3 hashes of the data.
#[derive(Debug)]
pub struct MemoryContentNetwork {
    pins: DashMap<String, Vec<u8>>,
    available: AtomicBool,
    uploads: AtomicUsize,
}

impl Default for MemoryContentNetwork {
    fn default() -> Self {
        Self {
            pins: DashMap::new(),
            available: AtomicBool::new(true),
            uploads: AtomicUsize::new(0),
        }
    }
}

impl MemoryContentNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: uploads and fetches fail while unavailable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn upload_calls(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn is_pinned(&self, cid: &str) -> bool {
        self.pins.contains_key(cid)
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentNetwork for MemoryContentNetwork {
    async fn upload(&self, data: &[u8], _captcha_token: &str) -> Result<String, ContentError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if !self.is_available() {
            return Err(ContentError::Upload("network unavailable".to_string()));
        }

        let cid = format!("b{}", blake3::hash(data).to_hex());
        self.pins.insert(cid.clone(), data.to_vec());
        Ok(cid)
    }

    async fn fetch(&self, cid: &str) -> Result<Vec<u8>, ContentError> {
        let fetch_error = |reason: &str| ContentError::Fetch {
            cid: cid.to_string(),
            reason: reason.to_string(),
        };

        if !self.is_available() {
            return Err(fetch_error("network unavailable"));
        }
        self.pins
            .get(cid)
            .map(|data| data.value().clone())
            .ok_or_else(|| fetch_error("not pinned"))
    }

    async fn unpin(&self, cid: &str) -> bool {
        self.pins.remove(cid).is_some()
    }
}

/// Doubles as the server-side pinning backend for local runs and tests.
#[async_trait]
impl super::PinService for MemoryContentNetwork {
    async fn pin(&self, data: Vec<u8>) -> Result<String, ContentError> {
        ContentNetwork::upload(self, &data, "").await
    }

    async fn unpin(&self, cid: &str) -> bool {
        ContentNetwork::unpin(self, cid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pin_fetch_unpin() {
        let network = MemoryContentNetwork::new();
        let cid = network.upload(b"ciphertext", "development-mode").await.unwrap();
        assert!(super::super::is_valid_cid(&cid));
        assert_eq!(network.fetch(&cid).await.unwrap(), b"ciphertext");

        assert!(network.unpin(&cid).await);
        assert!(!network.unpin(&cid).await);
        assert!(network.fetch(&cid).await.is_err());
    }

    #[tokio::test]
    async fn test_outage() {
        let network = MemoryContentNetwork::new();
        network.set_available(false);
        assert!(network.upload(b"x", "t").await.is_err());
        assert_eq!(network.upload_calls(), 1);
    }
}
