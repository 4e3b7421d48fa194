use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::commands;
use crate::config::{self, Config};
use crate::errors::AppResult;
use crate::uploader::ApiEndpoints;

/// Room for the text fields and multipart boundaries around the media part
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Shared by every request. Holds no per-request state.
pub struct AppState {
    pub http: reqwest::Client,
    pub endpoints: ApiEndpoints,
    pub temp_dir: PathBuf,
    pub max_media_bytes: u64,
    pub request_timeout: Duration,
    pub allow_private_media_hosts: bool,
    pub shutdown: CancellationToken,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: &Config, shutdown: CancellationToken) -> AppResult<Self> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            http,
            endpoints: ApiEndpoints::from_config(config),
            temp_dir: config::get_temp_directory(config)?,
            max_media_bytes: config.max_media_bytes,
            request_timeout,
            allow_private_media_hosts: config.allow_private_media_hosts,
            shutdown,
        })
    }
}

pub fn build_router(state: SharedState) -> Router {
    let body_limit = usize::try_from(state.max_media_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(FORM_OVERHEAD_BYTES);

    Router::new()
        .route("/api/tweet", post(commands::post_tweet))
        .route("/health", get(commands::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` is cancelled. In-flight requests observe the same
/// token and stop their uploads.
pub async fn serve(config: &Config, shutdown: CancellationToken) -> AppResult<()> {
    let state = Arc::new(AppState::new(config, shutdown.clone())?);
    let app = build_router(state);

    let listener = TcpListener::bind((config.bind_address.as_str(), config.port)).await?;
    log::info!("Server running on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    log::info!("Server stopped");
    Ok(())
}
