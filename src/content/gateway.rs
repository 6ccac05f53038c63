use super::{is_valid_cid, ContentError};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Fetches pinned content from an ordered list of public gateways.
///
/// Each attempt is independently bounded by `timeout`; the first gateway to
/// answer with a success status wins.
pub struct GatewayFetcher {
    http: Client,
    gateways: Vec<String>,
    timeout: Duration,
}

impl std::fmt::Debug for GatewayFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayFetcher")
            .field("gateways", &self.gateways)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GatewayFetcher {
    pub fn new<I, S>(gateways: I, timeout: Duration) -> Result<Self, ContentError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let http = Client::builder().build()?;
        let gateways = gateways
            .into_iter()
            .map(|g| g.into().trim_end_matches('/').to_string())
            .collect();

        Ok(Self {
            http,
            gateways,
            timeout,
        })
    }

    pub fn gateways(&self) -> &[String] {
        &self.gateways
    }

    pub async fn fetch(&self, cid: &str) -> Result<Vec<u8>, ContentError> {
        if !is_valid_cid(cid) {
            return Err(ContentError::Fetch {
                cid: cid.to_string(),
                reason: "invalid content id".to_string(),
            });
        }

        let mut last_error = String::from("no gateways configured");

        for gateway in &self.gateways {
            let url = format!("{}/{}", gateway, cid);
            debug!("Fetching {} from {}", cid, gateway);

            match tokio::time::timeout(self.timeout, self.fetch_once(&url)).await {
                Ok(Ok(bytes)) => return Ok(bytes),
                Ok(Err(reason)) => {
                    warn!("Gateway {} failed: {}", gateway, reason);
                    last_error = reason;
                }
                Err(_) => {
                    warn!("Gateway {} timed out after {:?}", gateway, self.timeout);
                    last_error = format!("timed out after {:?}", self.timeout);
                }
            }
        }

        Err(ContentError::Fetch {
            cid: cid.to_string(),
            reason: last_error,
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self.http.get(url).send().await.map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(bytes.to_vec())
    }
}
