use std::sync::Arc;
use timevault::{
    captcha::TurnstileVerifier,
    config::AppConfig,
    content::PinataClient,
    reliability::RateLimiter,
    web::{self, UploadState},
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Timeout for calls to the pinning and CAPTCHA services.
const UPSTREAM_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timevault=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting timevault v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::init()?;
    info!("Configuration loaded");

    let upstream_timeout = std::time::Duration::from_secs(UPSTREAM_TIMEOUT_SECS);

    let pinning = PinataClient::new(
        &config.pinning.api_url,
        config.pinning.jwt.clone(),
        upstream_timeout,
    )?;
    if !pinning.is_configured() {
        warn!("Pinning JWT not configured, uploads will fail. Set TIMEVAULT_PINNING__JWT");
    }

    let captcha = TurnstileVerifier::new(
        &config.captcha.verify_url,
        config.captcha.secret_key.clone(),
        config.captcha.development_token.clone(),
        upstream_timeout,
    )?;
    if config.captcha.secret_key.is_none() {
        warn!("CAPTCHA secret key not configured, verification is disabled");
    }

    let limiter = Arc::new(RateLimiter::new());
    let sweeper = limiter.spawn_sweeper(config.upload.sweep_interval());

    let state = UploadState {
        limiter,
        captcha: Arc::new(captcha),
        pinning: Arc::new(pinning),
        limits: config.upload.limits(),
    };
    let app = web::create_router(state);

    let addr = config.web.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("Web server listening on http://{}", addr);
    info!("Share links use {}", config.web.base_url());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await?;

    sweeper.abort();
    Ok(())
}
