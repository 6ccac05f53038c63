use crate::captcha::CaptchaError;
use crate::content::ContentError;
use crate::crypto::{CryptoError, EncodingError};
use crate::timelock::TimeLockError;
use thiserror::Error;

/// Application-wide error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Encryption error: {0}")]
    Encryption(#[from] CryptoError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Time-lock error: {0}")]
    TimeLock(#[from] TimeLockError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Content network error: {0}")]
    Content(#[from] ContentError),

    #[error("Captcha service error: {0}")]
    Captcha(#[from] CaptchaError),

    #[error("CAPTCHA verification failed")]
    CaptchaRejected,

    #[error("Payload too large (limit {max_bytes} bytes)")]
    PayloadTooLarge { max_bytes: usize },

    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("Operation already in progress")]
    AlreadyInProgress,

    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },

    #[error("Draft was discarded while arming")]
    Discarded,

    #[error("Vault not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Single user-presentable message for this error class.
    ///
    /// Never includes internal detail; every message points at a next action.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Encryption(_) | Self::Encoding(_) => {
                "The vault could not be decrypted. The link may be incomplete or corrupted."
                    .to_string()
            }
            Self::TimeLock(TimeLockError::NotYetUnlockable { .. }) => {
                "This vault is still locked. Try again after the unlock time.".to_string()
            }
            Self::TimeLock(TimeLockError::Network(_)) => {
                "Could not reach the time-lock network. Check your connection and try again."
                    .to_string()
            }
            Self::TimeLock(TimeLockError::Integrity) => {
                "The vault key failed verification. The link may be incomplete or corrupted."
                    .to_string()
            }
            Self::Persistence(_) | Self::Database(_) => {
                "Could not save to local storage. Please try again.".to_string()
            }
            Self::Content(_) => {
                "Could not reach the storage network. Please try again.".to_string()
            }
            Self::CaptchaRejected => "CAPTCHA verification failed".to_string(),
            Self::PayloadTooLarge { max_bytes } => {
                format!("File too large. Maximum size is {}.", human_size(*max_bytes))
            }
            Self::RateLimitExceeded { retry_after_secs } => format!(
                "Rate limit exceeded. Try again in {} minutes.",
                retry_after_secs.div_ceil(60)
            ),
            Self::AlreadyInProgress => {
                "This action is already in progress. Please wait for it to finish.".to_string()
            }
            Self::InvalidTransition { .. } => {
                "That action is not available right now. Go back and try again.".to_string()
            }
            Self::Discarded => "The draft was discarded. Start a new vault.".to_string(),
            Self::NotFound => {
                "This vault doesn't exist. Make sure you have the complete shareable link."
                    .to_string()
            }
            Self::Config(_)
            | Self::Http(_)
            | Self::Serialization(_)
            | Self::Captcha(_)
            | Self::Internal(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}

fn human_size(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{}KB", bytes.div_ceil(1024))
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convert AppError to HTTP status codes for web responses
impl AppError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Http(_) => StatusCode::BAD_GATEWAY,
            Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Encryption(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Encoding(_) => StatusCode::BAD_REQUEST,
            Self::TimeLock(TimeLockError::NotYetUnlockable { .. }) => StatusCode::LOCKED,
            Self::TimeLock(TimeLockError::Integrity) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::TimeLock(TimeLockError::Network(_)) => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Content(_) => StatusCode::BAD_GATEWAY,
            Self::Captcha(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::CaptchaRejected => StatusCode::FORBIDDEN,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::AlreadyInProgress => StatusCode::CONFLICT,
            Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::Discarded => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "success": false,
            "error": self.user_message(),
        });
        (status, axum::Json(body)).into_response()
    }
}
