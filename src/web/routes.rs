use crate::web::upload::{self, UploadState};
use axum::{
    extract::DefaultBodyLimit,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Multipart framing allowance on top of the payload cap, so a slightly
/// oversized file still reaches the handler and gets the size message.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create the HTTP router
pub fn create_router(state: UploadState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.limits.max_bytes + FORM_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/upload",
            post(upload::upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/unpin", post(upload::unpin))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captcha::{CaptchaError, CaptchaVerifier};
    use crate::content::{MemoryContentNetwork, RemoteContentNetwork, UploadApiClient};
    use crate::content::{ContentNetwork, GatewayFetcher};
    use crate::reliability::{RateLimiter, RetryPolicy};
    use crate::web::upload::UploadLimits;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    const BOUNDARY: &str = "timevault-test-boundary";

    /// Accepts exactly one token.
    struct FixedCaptcha;

    #[async_trait]
    impl CaptchaVerifier for FixedCaptcha {
        async fn verify(&self, token: &str, _caller: &str) -> Result<bool, CaptchaError> {
            Ok(token == "good")
        }
    }

    fn state_with(pins: Arc<MemoryContentNetwork>, limits: UploadLimits) -> UploadState {
        UploadState {
            limiter: Arc::new(RateLimiter::new()),
            captcha: Arc::new(FixedCaptcha),
            pinning: pins,
            limits,
        }
    }

    fn small_limits() -> UploadLimits {
        UploadLimits {
            max_bytes: 1024,
            rate_limit_max: 5,
            rate_limit_window: Duration::from_secs(3600),
        }
    }

    fn multipart_body(file: Option<&[u8]>, token: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(token) = token {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"captchaToken\"\r\n\r\n{token}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(file) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"vault.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(file);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(file: Option<&[u8]>, token: Option<&str>, caller: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header("x-forwarded-for", caller)
            .body(Body::from(multipart_body(file, token)))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(state_with(Arc::new(MemoryContentNetwork::new()), small_limits()));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_upload_pins_and_returns_cid() {
        let pins = Arc::new(MemoryContentNetwork::new());
        let app = create_router(state_with(pins.clone(), small_limits()));

        let response = app
            .oneshot(upload_request(Some(&b"ciphertext"[..]), Some("good"), "203.0.113.7"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "5");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "4");
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        let cid = body["cid"].as_str().unwrap();
        assert!(pins.is_pinned(cid));
    }

    #[tokio::test]
    async fn test_upload_rejections() {
        let pins = Arc::new(MemoryContentNetwork::new());
        let app = create_router(state_with(pins.clone(), small_limits()));

        let data: &[u8] = b"data";
        let oversized = vec![0u8; 2048];
        let cases: Vec<(Option<&[u8]>, Option<&str>, StatusCode, &str)> = vec![
            (None, Some("good"), StatusCode::BAD_REQUEST, "No file provided"),
            (Some(data), None, StatusCode::BAD_REQUEST, "CAPTCHA token required"),
            (Some(data), Some("bad"), StatusCode::FORBIDDEN, "CAPTCHA verification failed"),
            (
                Some(oversized.as_slice()),
                Some("good"),
                StatusCode::PAYLOAD_TOO_LARGE,
                "File too large. Maximum size is 1KB.",
            ),
        ];

        for (i, (file, token, status, message)) in cases.into_iter().enumerate() {
            let caller = format!("198.51.100.{}", i);
            let response = app
                .clone()
                .oneshot(upload_request(file, token, &caller))
                .await
                .unwrap();
            assert_eq!(response.status(), status, "case {}", i);
            let body = json_body(response).await;
            assert_eq!(body["success"], false);
            assert_eq!(body["error"], message);
        }

        assert_eq!(pins.upload_calls(), 0);
    }

    #[tokio::test]
    async fn test_pinning_outage_is_generic_500() {
        let pins = Arc::new(MemoryContentNetwork::new());
        pins.set_available(false);
        let app = create_router(state_with(pins, small_limits()));

        let response = app
            .oneshot(upload_request(Some(&b"data"[..]), Some("good"), "203.0.113.9"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"], "Upload failed. Please try again.");
    }

    #[tokio::test]
    async fn test_rate_limit_per_caller() {
        let limits = UploadLimits {
            rate_limit_max: 2,
            ..small_limits()
        };
        let app = create_router(state_with(Arc::new(MemoryContentNetwork::new()), limits));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(upload_request(Some(&b"data"[..]), Some("good"), "203.0.113.7"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(upload_request(Some(&b"data"[..]), Some("good"), "203.0.113.7"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(
            json_body(response).await["error"],
            "Rate limit exceeded. Try again in 60 minutes."
        );

        let response = app
            .oneshot(upload_request(Some(&b"data"[..]), Some("good"), "203.0.113.8"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unpin_endpoint() {
        let pins = Arc::new(MemoryContentNetwork::new());
        let cid = ContentNetwork::upload(pins.as_ref(), b"data", "").await.unwrap();
        let app = create_router(state_with(pins.clone(), small_limits()));

        let unpin = |body: &'static str| {
            Request::post("/api/unpin")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap()
        };

        let response = app.clone().oneshot(unpin("{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "CID is required");

        let request = Request::post("/api/unpin")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::json!({ "cid": cid }).to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["unpinned"], true);
        assert!(!pins.is_pinned(&cid));

        let response = app.oneshot(unpin(r#"{"cid":"../etc"}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["unpinned"], false);
    }

    #[tokio::test]
    async fn test_upload_client_against_router() {
        let pins = Arc::new(MemoryContentNetwork::new());
        let app = create_router(state_with(pins.clone(), small_limits()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let uploader =
            UploadApiClient::new(&base, Duration::from_secs(5), RetryPolicy::new(1)).unwrap();
        let fetcher = GatewayFetcher::new([format!("{}/ipfs", base)], Duration::from_secs(1)).unwrap();
        let network = RemoteContentNetwork::new(uploader, fetcher);

        let cid = network.upload(b"ciphertext", "good").await.unwrap();
        assert!(pins.is_pinned(&cid));

        let err = network.upload(b"ciphertext", "bad").await.unwrap_err();
        assert!(err.to_string().contains("CAPTCHA verification failed"));

        assert!(network.unpin(&cid).await);
        assert!(!pins.is_pinned(&cid));
    }
}
