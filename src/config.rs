use crate::captcha::TURNSTILE_VERIFY_URL;
use crate::content::DEFAULT_GATEWAYS;
use crate::web::UploadLimits;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Web server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base for share and backup links
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
        }
    }
}

/// Upload endpoint admission settings
#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    /// How often expired rate-limit windows are swept
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_max_bytes() -> usize {
    1024 * 1024
}

fn default_rate_limit_max() -> u32 {
    5
}

fn default_rate_limit_window_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    600
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            rate_limit_max: default_rate_limit_max(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl UploadConfig {
    pub fn limits(&self) -> UploadLimits {
        UploadLimits {
            max_bytes: self.max_bytes,
            rate_limit_max: self.rate_limit_max,
            rate_limit_window: Duration::from_secs(self.rate_limit_window_secs),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Pinning service and gateway settings
#[derive(Deserialize, Clone)]
pub struct PinningConfig {
    #[serde(default = "default_pinning_api_url")]
    pub api_url: String,
    /// Service credential; uploads fail without it
    #[serde(default)]
    pub jwt: Option<String>,
    #[serde(default = "default_gateways")]
    pub gateways: Vec<String>,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_upload_attempts")]
    pub upload_attempts: u32,
}

fn default_pinning_api_url() -> String {
    "https://api.pinata.cloud".to_string()
}

fn default_gateways() -> Vec<String> {
    DEFAULT_GATEWAYS.iter().map(|g| g.to_string()).collect()
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_upload_attempts() -> u32 {
    3
}

impl Default for PinningConfig {
    fn default() -> Self {
        Self {
            api_url: default_pinning_api_url(),
            jwt: None,
            gateways: default_gateways(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            upload_attempts: default_upload_attempts(),
        }
    }
}

impl PinningConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl std::fmt::Debug for PinningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinningConfig")
            .field("api_url", &self.api_url)
            .field("has_jwt", &self.jwt.is_some())
            .field("gateways", &self.gateways)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("upload_attempts", &self.upload_attempts)
            .finish()
    }
}

/// CAPTCHA verification settings
#[derive(Deserialize, Clone)]
pub struct CaptchaConfig {
    #[serde(default = "default_verify_url")]
    pub verify_url: String,
    /// Verification is skipped with a warning when absent
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Always accepted, for local development
    #[serde(default = "default_development_token")]
    pub development_token: Option<String>,
}

fn default_verify_url() -> String {
    TURNSTILE_VERIFY_URL.to_string()
}

fn default_development_token() -> Option<String> {
    Some("development-mode".to_string())
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            verify_url: default_verify_url(),
            secret_key: None,
            development_token: default_development_token(),
        }
    }
}

impl std::fmt::Debug for CaptchaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptchaConfig")
            .field("verify_url", &self.verify_url)
            .field("has_secret_key", &self.secret_key.is_some())
            .field("development_token", &self.development_token)
            .finish()
    }
}

/// Root application configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub pinning: PinningConfig,
    #[serde(default)]
    pub captcha: CaptchaConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g. TIMEVAULT_WEB__PORT, TIMEVAULT_PINNING__JWT
            .add_source(
                Environment::with_prefix("TIMEVAULT")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("pinning.gateways"),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Initialize the global config singleton
    pub fn init() -> Result<&'static Self, ConfigError> {
        let config = Self::load()?;
        Ok(CONFIG.get_or_init(|| config))
    }

    /// Global config, if [`AppConfig::init`] has run
    pub fn get() -> Option<&'static Self> {
        CONFIG.get()
    }
}

impl WebConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Public base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.upload.max_bytes, 1024 * 1024);
        assert_eq!(config.upload.limits().rate_limit_max, 5);
        assert_eq!(config.upload.limits().rate_limit_window, Duration::from_secs(3600));
        assert_eq!(config.pinning.gateways.len(), DEFAULT_GATEWAYS.len());
        assert_eq!(config.pinning.upload_attempts, 3);
        assert_eq!(config.captcha.development_token.as_deref(), Some("development-mode"));
        assert_eq!(config.captcha.verify_url, TURNSTILE_VERIFY_URL);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: AppConfig = Config::builder()
            .set_override("web.port", 8080)
            .unwrap()
            .set_override("upload.rate_limit_max", 10)
            .unwrap()
            .set_override("web.public_url", "https://vault.example/")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.web.port, 8080);
        assert_eq!(config.web.host, "0.0.0.0");
        assert_eq!(config.web.base_url(), "https://vault.example");
        assert_eq!(config.upload.rate_limit_max, 10);
        assert_eq!(config.upload.max_bytes, 1024 * 1024);
        assert!(config.pinning.jwt.is_none());
    }

    #[test]
    fn test_debug_hides_credentials() {
        let mut config = AppConfig::default();
        config.pinning.jwt = Some("eyJhbGciOi.secret".to_string());
        config.captcha.secret_key = Some("0x4AAA-secret".to_string());
        let debug = format!("{:?}", config);
        assert!(!debug.contains("eyJhbGciOi"));
        assert!(!debug.contains("0x4AAA"));
        assert!(debug.contains("has_jwt: true"));
    }
}
