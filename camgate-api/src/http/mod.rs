// Module: http
// HTTP routes for PTZ control, WHEP signaling and HLS playback

pub mod error;
pub mod health;
pub mod media;
pub mod ptz;

use axum::Router;
use camgate_core::ptz::PtzDispatcher;
use camgate_core::{Config, UpstreamResolver};
use camgate_proxy::MediaProxy;
use std::sync::Arc;
use tower_http::compression::predicate::{NotForContentType, Predicate};
use tower_http::compression::{CompressionLayer, DefaultPredicate};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};

/// Shared application state. Everything is built once at startup and is
/// read-only afterwards.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub resolver: Arc<UpstreamResolver>,
    pub proxy: MediaProxy,
    pub ptz: Arc<PtzDispatcher>,
}

impl AppState {
    /// Build every service from a validated configuration.
    pub fn from_config(config: Config) -> camgate_core::Result<Self> {
        let resolver = UpstreamResolver::from_config(&config.media)?;
        let proxy = MediaProxy::from_config(&config.media)?;
        let ptz = PtzDispatcher::from_config(&config.ptz)?;

        Ok(Self {
            config: Arc::new(config),
            resolver: Arc::new(resolver),
            proxy,
            ptz: Arc::new(ptz),
        })
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .merge(health::create_health_router())
        .merge(ptz::create_ptz_router())
        .merge(media::create_media_router());

    // Static frontend last so API routes always win
    if let Some(dir) = &state.config.server.static_dir {
        tracing::info!("Serving static files from {}", dir);
        router = router.fallback_service(ServeDir::new(dir));
    }

    // Media payloads are already compressed and SDP is relayed byte for byte.
    let compress_when = DefaultPredicate::new()
        .and(NotForContentType::const_new("video/"))
        .and(NotForContentType::const_new("audio/"))
        .and(NotForContentType::const_new("application/octet-stream"))
        .and(NotForContentType::const_new("application/sdp"));

    let router = router
        .layer(CompressionLayer::new().compress_when(compress_when))
        .layer(TraceLayer::new_for_http());

    // Apply state to all routes (must be last)
    router.with_state(state)
}
