use super::{is_valid_cid, ContentError, PinService};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PinResponse {
    ipfs_hash: String,
}

/// Pinata pinning API client. Holds the account JWT; server side only.
pub struct PinataClient {
    http: Client,
    api_url: String,
    jwt: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for PinataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinataClient")
            .field("api_url", &self.api_url)
            .field("has_jwt", &self.jwt.is_some())
            .finish_non_exhaustive()
    }
}

impl PinataClient {
    pub fn new(api_url: &str, jwt: Option<String>, timeout: Duration) -> Result<Self, ContentError> {
        let http = Client::builder().timeout(timeout).build()?;
        let jwt = jwt.filter(|j| !j.trim().is_empty()).map(Zeroizing::new);
        if jwt.is_none() {
            warn!("Pinata JWT not configured, uploads will be rejected");
        }

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            jwt,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.jwt.is_some()
    }
}

#[async_trait]
impl PinService for PinataClient {
    async fn pin(&self, data: Vec<u8>) -> Result<String, ContentError> {
        let jwt = self.jwt.as_ref().ok_or(ContentError::NotConfigured)?;
        let url = format!("{}/pinning/pinFileToIPFS", self.api_url);
        let size = data.len();

        let part = Part::bytes(data)
            .file_name("vault.bin")
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(&url)
            .bearer_auth(jwt.as_str())
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Pinata upload failed: {} {}", status, body);
            return Err(ContentError::Upload(format!("Pinata returned {}", status)));
        }

        let body: PinResponse = response.json().await?;
        info!(cid = %body.ipfs_hash, size, "Pinned vault payload");
        Ok(body.ipfs_hash)
    }

    async fn unpin(&self, cid: &str) -> bool {
        let Some(jwt) = self.jwt.as_ref() else {
            debug!("No Pinata JWT, leaving {} for garbage collection", cid);
            return false;
        };
        if !is_valid_cid(cid) {
            warn!("Refusing to unpin malformed content id");
            return false;
        }

        let url = format!("{}/pinning/unpin/{}", self.api_url, cid);
        let response = match self.http.delete(&url).bearer_auth(jwt.as_str()).send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Unpin request failed: {}", e);
                return false;
            }
        };

        match response.status() {
            status if status.is_success() => {
                info!(cid, "Unpinned vault payload");
                true
            }
            // Already unpinned or never pinned
            StatusCode::NOT_FOUND => false,
            status => {
                let body = response.text().await.unwrap_or_default();
                error!("Pinata unpin failed: {} {}", status, body);
                false
            }
        }
    }
}
