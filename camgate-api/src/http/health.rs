//! Health check endpoints
//!
//! Reports the running configuration for monitoring probes. Credentials are
//! never included.

use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::http::AppState;

/// Health check router
pub fn create_health_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/favicon.ico", get(favicon))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub mode: &'static str,
    pub cameras: BTreeMap<String, String>,
    pub ptz_transport: &'static str,
    pub whep_path_style: &'static str,
}

/// Always `ok` while the server is running
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        mode: state.resolver.mode().as_str(),
        cameras: state
            .ptz
            .cameras()
            .iter()
            .map(|(name, address)| (name.to_string(), address.to_string()))
            .collect(),
        ptz_transport: state.ptz.transport_name(),
        whep_path_style: state.proxy.relay.style().as_str(),
    })
}

#[allow(clippy::unused_async)]
pub async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}
