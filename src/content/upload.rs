use super::{is_valid_cid, ContentError, ContentNetwork, GatewayFetcher};
use crate::reliability::retry::{warn_on_retry, with_retry, RetryPolicy};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Body returned by the upload endpoint, on success or rejection.
#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub cid: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct UnpinRequest<'a> {
    cid: &'a str,
}

#[derive(Debug, Deserialize)]
struct UnpinResponse {
    #[serde(default)]
    unpinned: bool,
}

/// Client for the upload/unpin HTTP endpoints served by [`crate::web`].
///
/// Uploads go through the retry engine; unpin is best effort and not retried.
pub struct UploadApiClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for UploadApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadApiClient")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl UploadApiClient {
    pub fn new(base_url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self, ContentError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    pub async fn upload(&self, data: &[u8], captcha_token: &str) -> Result<String, ContentError> {
        with_retry(&self.retry, warn_on_retry::<ContentError>("content upload"), || {
            self.upload_once(data, captcha_token)
        })
        .await
    }

    async fn upload_once(&self, data: &[u8], captcha_token: &str) -> Result<String, ContentError> {
        let url = format!("{}/api/upload", self.base_url);
        let part = Part::bytes(data.to_vec())
            .file_name("vault.bin")
            .mime_str("application/octet-stream")?;
        let form = Form::new()
            .part("file", part)
            .text("captchaToken", captcha_token.to_string());

        let response = self.http.post(&url).multipart(form).send().await?;
        let status = response.status();
        let body: UploadResponse = response.json().await.unwrap_or(UploadResponse {
            success: false,
            cid: None,
            error: None,
        });

        match body.cid {
            Some(cid) if status.is_success() && body.success && is_valid_cid(&cid) => {
                debug!(cid = %cid, "Upload accepted");
                Ok(cid)
            }
            _ => Err(ContentError::Upload(
                body.error
                    .unwrap_or_else(|| format!("Upload failed ({})", status.as_u16())),
            )),
        }
    }

    pub async fn unpin(&self, cid: &str) -> bool {
        let url = format!("{}/api/unpin", self.base_url);
        let result = async {
            let response = self
                .http
                .post(&url)
                .json(&UnpinRequest { cid })
                .send()
                .await?
                .error_for_status()?;
            response.json::<UnpinResponse>().await
        }
        .await;

        match result {
            Ok(body) => body.unpinned,
            Err(e) => {
                warn!("Unpin request failed: {}", e);
                false
            }
        }
    }
}

/// Content network reached over HTTP: uploads through the upload endpoint,
/// fetches through public gateways.
#[derive(Debug)]
pub struct RemoteContentNetwork {
    uploader: UploadApiClient,
    fetcher: GatewayFetcher,
}

impl RemoteContentNetwork {
    pub fn new(uploader: UploadApiClient, fetcher: GatewayFetcher) -> Self {
        Self { uploader, fetcher }
    }
}

#[async_trait]
impl ContentNetwork for RemoteContentNetwork {
    async fn upload(&self, data: &[u8], captcha_token: &str) -> Result<String, ContentError> {
        self.uploader.upload(data, captcha_token).await
    }

    async fn fetch(&self, cid: &str) -> Result<Vec<u8>, ContentError> {
        self.fetcher.fetch(cid).await
    }

    async fn unpin(&self, cid: &str) -> bool {
        self.uploader.unpin(cid).await
    }
}
