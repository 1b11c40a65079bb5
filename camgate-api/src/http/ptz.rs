//! PTZ control endpoints
//!
//! `POST /api/ptz/start`, `POST /api/ptz/stop` and `POST /api/ptz/preset`.
//! Parameters come from the JSON body, the query string, or both.
//! `GET /api/test/{camera}` checks that a camera answers with a snapshot.
//! Dispatch runs on its own task so a command already on its way to the
//! device completes even when the client hangs up.

use std::str::FromStr;

use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use camgate_core::ptz::{CameraCheck, DispatchOutcome, PtzAction, StepReply, DEFAULT_CAMERA};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::http::error::{AppError, AppResult};
use crate::http::AppState;

pub fn create_ptz_router() -> Router<AppState> {
    Router::new()
        .route("/api/ptz/start", post(start))
        .route("/api/ptz/stop", post(stop))
        .route("/api/ptz/preset", post(preset))
        .route("/api/test/{camera}", get(check_camera))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Fields shared by every PTZ endpoint. The JSON body is read first and
/// query parameters override it field by field.
#[derive(Debug, Default, Deserialize)]
pub struct PtzRequest {
    #[serde(alias = "cam")]
    pub camera: Option<String>,
    pub action: Option<String>,
    /// Raw device motion code, accepted instead of `action`
    pub code: Option<String>,
    pub speed: Option<u32>,
    #[serde(alias = "id")]
    pub preset: Option<u32>,
}

/// Reply for every PTZ endpoint
#[derive(Debug, Serialize)]
pub struct PtzResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-command detail, only for actions made of several commands
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepReply>,
}

impl From<&DispatchOutcome> for PtzResponse {
    fn from(outcome: &DispatchOutcome) -> Self {
        // Report the first failure, or the last command when all succeeded.
        let summary = outcome.first_failure().or_else(|| outcome.steps.last());
        Self {
            ok: outcome.ok(),
            status: summary.and_then(|s| s.reply.status),
            result: summary.and_then(|s| s.reply.result.clone()),
            error: summary.and_then(|s| s.reply.error.clone()),
            steps: if outcome.steps.len() > 1 {
                outcome.steps.clone()
            } else {
                Vec::new()
            },
        }
    }
}

fn into_response(outcome: &DispatchOutcome) -> Response {
    let status = StatusCode::from_u16(outcome.http_status()).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(PtzResponse::from(outcome))).into_response()
}

fn parse_number(field: &str, value: &str) -> AppResult<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::bad_request(format!("{field} must be a non-negative integer")))
}

impl PtzRequest {
    /// An empty body is read as `{}`.
    fn from_parts(query: Option<&str>, body: &Bytes) -> AppResult<Self> {
        let mut req: Self = if body.iter().all(u8::is_ascii_whitespace) {
            Self::default()
        } else {
            serde_json::from_slice(body)?
        };
        if let Some(query) = query {
            req.overlay_query(query)?;
        }
        Ok(req)
    }

    fn overlay_query(&mut self, query: &str) -> AppResult<()> {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "camera" | "cam" => self.camera = Some(value.into_owned()),
                "action" => self.action = Some(value.into_owned()),
                "code" => self.code = Some(value.into_owned()),
                "speed" => self.speed = Some(parse_number("speed", &value)?),
                "preset" | "id" => self.preset = Some(parse_number("preset", &value)?),
                _ => {}
            }
        }
        Ok(())
    }

    /// An explicit name is used as given, even when empty.
    fn camera(&self) -> String {
        self.camera.clone().unwrap_or_else(|| DEFAULT_CAMERA.to_string())
    }

    fn action(&self) -> AppResult<PtzAction> {
        match (&self.action, &self.code) {
            (Some(action), _) => Ok(PtzAction::from_str(action)?),
            (None, Some(code)) => Ok(PtzAction::from_device_code(code)?),
            (None, None) => Err(AppError::bad_request("action is required")),
        }
    }
}

/// Start continuous motion, zoom, or a preset move.
pub async fn start(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> AppResult<Response> {
    let req = PtzRequest::from_parts(query.as_deref(), &body)?;
    let action = req.action()?;
    let arg = match action {
        PtzAction::GotoPreset => req.preset,
        _ => req.speed,
    };

    let camera = req.camera();
    let ptz = state.ptz.clone();
    let outcome = tokio::spawn(async move { ptz.dispatch(&camera, action, arg).await })
        .await
        .map_err(|e| anyhow::anyhow!("PTZ dispatch task failed: {e}"))??;

    Ok(into_response(&outcome))
}

/// Halt all motion.
pub async fn stop(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> AppResult<Response> {
    let camera = PtzRequest::from_parts(query.as_deref(), &body)?.camera();

    let ptz = state.ptz.clone();
    let outcome = tokio::spawn(async move { ptz.stop(&camera).await })
        .await
        .map_err(|e| anyhow::anyhow!("PTZ dispatch task failed: {e}"))??;

    Ok(into_response(&outcome))
}

/// Move to a stored preset.
pub async fn preset(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> AppResult<Response> {
    let req = PtzRequest::from_parts(query.as_deref(), &body)?;
    let preset = req
        .preset
        .ok_or_else(|| AppError::bad_request("preset is required"))?;

    let camera = req.camera();
    let ptz = state.ptz.clone();
    let outcome = tokio::spawn(async move { ptz.goto_preset(&camera, preset).await })
        .await
        .map_err(|e| anyhow::anyhow!("PTZ dispatch task failed: {e}"))??;

    Ok(into_response(&outcome))
}

/// Reply for `GET /api/test/{camera}`
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub status: &'static str,
    pub camera: String,
    pub address: String,
    pub snapshot_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<CameraCheck> for CheckResponse {
    fn from(check: CameraCheck) -> Self {
        let message = check.failure();
        Self {
            status: if message.is_none() { "ok" } else { "error" },
            camera: check.camera,
            address: check.address,
            snapshot_size: check.snapshot.size,
            message,
        }
    }
}

/// Fetch a snapshot from the camera. Anything short of a full image is a 502.
pub async fn check_camera(
    State(state): State<AppState>,
    Path(camera): Path<String>,
) -> AppResult<Response> {
    let ptz = state.ptz.clone();
    let check = tokio::spawn(async move { ptz.check(&camera).await })
        .await
        .map_err(|e| anyhow::anyhow!("Camera check task failed: {e}"))?
        .map_err(|err| match err {
            camgate_core::Error::UnknownCamera(name) => {
                AppError::new(StatusCode::NOT_FOUND, format!("Unknown camera: {name}"))
            }
            other => AppError::from(other),
        })?;

    let status = if check.ok() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(CheckResponse::from(check))).into_response())
}
