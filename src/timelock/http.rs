use super::{TimeLockError, TimeLockNetwork, WrappedKey};
use crate::crypto::encoding::{from_base64url, to_base64url};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};
use zeroize::Zeroizing;

/// Request body for wrapping a key
#[derive(Debug, Serialize)]
pub struct WrapRequest<'a> {
    pub key: &'a str,
    pub unlock_time: i64,
}

/// Request body for releasing a key
#[derive(Debug, Serialize)]
pub struct UnwrapRequest<'a> {
    pub wrapped_key: &'a str,
    pub digest: &'a str,
    pub unlock_time: i64,
}

#[derive(Deserialize)]
struct UnwrapResponse {
    key: String,
}

/// Error body returned by the gateway
#[derive(Debug, Deserialize)]
pub struct GatewayError {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// Time-lock network reached through a JSON condition-release gateway.
pub struct HttpTimeLockNetwork {
    http: Client,
    base_url: String,
}

impl std::fmt::Debug for HttpTimeLockNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTimeLockNetwork")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpTimeLockNetwork {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TimeLockError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TimeLockError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        unlock_time: DateTime<Utc>,
    ) -> Result<reqwest::Response, TimeLockError> {
        let url = self.endpoint(path);
        let response = self.http.post(&url).json(body).send().await.map_err(|e| {
            error!("Time-lock request to {} failed: {}", url, e);
            TimeLockError::network(e.to_string())
        })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body: GatewayError = response.json().await.unwrap_or(GatewayError {
            error: String::new(),
            code: None,
        });
        Err(classify_failure(status, &body, unlock_time))
    }
}

/// Map a gateway failure onto the time-lock error taxonomy.
pub fn classify_failure(
    status: StatusCode,
    body: &GatewayError,
    unlock_time: DateTime<Utc>,
) -> TimeLockError {
    match (status, body.code.as_deref()) {
        (_, Some("not_yet_unlockable")) | (StatusCode::LOCKED, _) => {
            TimeLockError::NotYetUnlockable { unlock_time }
        }
        (_, Some("integrity")) | (StatusCode::CONFLICT, _) => TimeLockError::Integrity,
        _ => {
            warn!("Time-lock gateway returned {}: {}", status, body.error);
            TimeLockError::network(format!("Gateway returned {}", status))
        }
    }
}

#[async_trait]
impl TimeLockNetwork for HttpTimeLockNetwork {
    async fn initialize(&self) -> Result<(), TimeLockError> {
        let url = self.endpoint("/health");
        debug!("Checking time-lock gateway health at {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| TimeLockError::network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TimeLockError::network(format!(
                "Gateway health check returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn wrap(
        &self,
        raw_key: &[u8],
        unlock_time: DateTime<Utc>,
    ) -> Result<WrappedKey, TimeLockError> {
        let key = Zeroizing::new(to_base64url(raw_key));
        let request = WrapRequest {
            key: &key,
            unlock_time: unlock_time.timestamp_millis(),
        };

        let response = self.post_json("/v1/wrap", &request, unlock_time).await?;
        response.json::<WrappedKey>().await.map_err(|e| {
            error!("Failed to parse wrap response: {}", e);
            TimeLockError::network(e.to_string())
        })
    }

    async fn unwrap(
        &self,
        wrapped_key: &str,
        digest: &str,
        unlock_time: DateTime<Utc>,
    ) -> Result<Zeroizing<Vec<u8>>, TimeLockError> {
        let request = UnwrapRequest {
            wrapped_key,
            digest,
            unlock_time: unlock_time.timestamp_millis(),
        };

        let response = self.post_json("/v1/unwrap", &request, unlock_time).await?;
        let body: UnwrapResponse = response.json().await.map_err(|e| {
            error!("Failed to parse unwrap response: {}", e);
            TimeLockError::network(e.to_string())
        })?;
        let body = Zeroizing::new(body.key);

        from_base64url(&body)
            .map(Zeroizing::new)
            .map_err(|_| TimeLockError::Integrity)
    }
}
