//! Upload and unpin endpoints in front of the pinning service.
//!
//! Only ciphertext ever reaches these handlers. Uploads are gated by a
//! per-caller rate limit, a CAPTCHA and a size cap before anything is pinned.

use crate::captcha::SharedCaptchaVerifier;
use crate::content::{is_valid_cid, SharedPinService};
use crate::error::{AppError, AppResult};
use crate::reliability::{RateLimitDecision, RateLimiter};
use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        Multipart, State,
    },
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Admission limits for the upload endpoint.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_bytes: usize,
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: 1024 * 1024,
            rate_limit_max: 5,
            rate_limit_window: Duration::from_secs(3600),
        }
    }
}

/// Shared state for the upload boundary.
#[derive(Clone)]
pub struct UploadState {
    pub limiter: Arc<RateLimiter>,
    pub captcha: SharedCaptchaVerifier,
    pub pinning: SharedPinService,
    pub limits: UploadLimits,
}

#[derive(Debug, Serialize)]
pub struct UploadSuccess {
    pub success: bool,
    pub cid: String,
}

#[derive(Debug, Deserialize)]
pub struct UnpinRequest {
    #[serde(default)]
    pub cid: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UnpinResponse {
    pub success: bool,
    pub unpinned: bool,
}

#[derive(Default)]
struct UploadForm {
    file: Option<Bytes>,
    captcha_token: Option<String>,
}

/// Caller address used for rate limiting: first `x-forwarded-for` hop,
/// then `x-real-ip`, then `unknown`.
pub fn client_address(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip"))
        .unwrap_or("unknown")
        .to_string()
}

/// Handler: POST /api/upload
///
/// Multipart form with `file` and `captchaToken`. Replies
/// `{ success: true, cid }` or `{ success: false, error }`.
pub async fn upload(
    State(state): State<UploadState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let caller = client_address(&headers);
    let decision = state.limiter.check(
        &format!("upload:{}", caller),
        state.limits.rate_limit_max,
        state.limits.rate_limit_window,
    );

    let result = if decision.allowed {
        accept_upload(&state, &caller, multipart).await
    } else {
        warn!(caller = %caller, "Upload rate limit exceeded");
        Err(AppError::RateLimitExceeded {
            retry_after_secs: decision.reset_in_secs,
        })
    };

    let mut response = match result {
        Ok(cid) => Json(UploadSuccess { success: true, cid }).into_response(),
        Err(e) => upload_error_response(e),
    };
    apply_rate_limit_headers(&mut response, &decision);
    response
}

async fn accept_upload(
    state: &UploadState,
    caller: &str,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<String> {
    let max_bytes = state.limits.max_bytes;
    let mut multipart = multipart.map_err(|_| AppError::validation("Invalid form data"))?;
    let form = read_form(&mut multipart, max_bytes).await?;

    let data = form
        .file
        .ok_or_else(|| AppError::validation("No file provided"))?;
    let token = form
        .captcha_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::validation("CAPTCHA token required"))?;

    if !state.captcha.verify(&token, caller).await? {
        warn!(caller = %caller, "CAPTCHA rejected");
        return Err(AppError::CaptchaRejected);
    }

    if data.len() > max_bytes {
        return Err(AppError::PayloadTooLarge { max_bytes });
    }

    let size = data.len();
    let cid = state.pinning.pin(data.to_vec()).await?;
    info!(cid = %cid, size, "Upload pinned");
    Ok(cid)
}

async fn read_form(multipart: &mut Multipart, max_bytes: usize) -> AppResult<UploadForm> {
    let form_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge { max_bytes }
        } else {
            AppError::validation("Invalid form data")
        }
    };

    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => form.file = Some(field.bytes().await.map_err(form_error)?),
            "captchaToken" => form.captcha_token = Some(field.text().await.map_err(form_error)?),
            _ => {}
        }
    }
    Ok(form)
}

/// Client errors keep their specific message; anything server-side collapses
/// to a generic 500.
fn upload_error_response(err: AppError) -> Response {
    if err.status_code().is_server_error() {
        error!("Upload failed: {}", err);
        let body = serde_json::json!({
            "success": false,
            "error": "Upload failed. Please try again.",
        });
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
    }
    err.into_response()
}

fn apply_rate_limit_headers(response: &mut Response, decision: &RateLimitDecision) {
    for (name, value) in decision.headers() {
        if let Ok(value) = HeaderValue::from_str(&value) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(name), value);
        }
    }
}

/// Handler: POST /api/unpin
///
/// Best effort. Anything other than a missing id answers `success: true`.
pub async fn unpin(
    State(state): State<UploadState>,
    body: Result<Json<UnpinRequest>, JsonRejection>,
) -> Response {
    let cid = body
        .ok()
        .and_then(|Json(request)| request.cid)
        .filter(|cid| !cid.is_empty());

    let Some(cid) = cid else {
        let body = serde_json::json!({ "success": false, "error": "CID is required" });
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    };

    let unpinned = if is_valid_cid(&cid) {
        state.pinning.unpin(&cid).await
    } else {
        warn!("Ignoring unpin for malformed content id");
        false
    };

    Json(UnpinResponse {
        success: true,
        unpinned,
    })
    .into_response()
}
