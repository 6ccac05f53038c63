//! CAPTCHA verification for the upload endpoint (Cloudflare Turnstile).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use zeroize::Zeroizing;

pub const TURNSTILE_VERIFY_URL: &str =
    "https://challenges.cloudflare.com/turnstile/v0/siteverify";

#[derive(Error, Debug)]
pub enum CaptchaError {
    #[error("Verification request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// Whether `token` is a valid solution submitted from `caller`.
    async fn verify(&self, token: &str, caller: &str) -> Result<bool, CaptchaError>;
}

pub type SharedCaptchaVerifier = Arc<dyn CaptchaVerifier>;

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

pub struct TurnstileVerifier {
    http: Client,
    verify_url: String,
    secret_key: Option<Zeroizing<String>>,
    development_token: Option<String>,
}

impl std::fmt::Debug for TurnstileVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnstileVerifier")
            .field("verify_url", &self.verify_url)
            .field("has_secret", &self.secret_key.is_some())
            .finish_non_exhaustive()
    }
}

impl TurnstileVerifier {
    pub fn new(
        verify_url: &str,
        secret_key: Option<String>,
        development_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CaptchaError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            verify_url: verify_url.to_string(),
            secret_key: secret_key.filter(|s| !s.is_empty()).map(Zeroizing::new),
            development_token: development_token.filter(|t| !t.is_empty()),
        })
    }
}

#[async_trait]
impl CaptchaVerifier for TurnstileVerifier {
    async fn verify(&self, token: &str, caller: &str) -> Result<bool, CaptchaError> {
        if self.development_token.as_deref() == Some(token) {
            debug!("Accepting development CAPTCHA token");
            return Ok(true);
        }

        let Some(secret) = self.secret_key.as_ref() else {
            warn!("CAPTCHA secret key not configured, skipping verification");
            return Ok(true);
        };

        let response: SiteVerifyResponse = self
            .http
            .post(&self.verify_url)
            .form(&[
                ("secret", secret.as_str()),
                ("response", token),
                ("remoteip", caller),
            ])
            .send()
            .await?
            .json()
            .await?;

        if !response.success {
            debug!(codes = ?response.error_codes, "CAPTCHA rejected");
        }
        Ok(response.success)
    }
}
