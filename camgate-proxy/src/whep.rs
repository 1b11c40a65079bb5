//! WHEP signaling relay
//!
//! SDP offers and answers are opaque bytes: they are never decoded,
//! re-encoded or re-terminated on the way through. The outbound
//! `Content-Length` is always the exact length of the bytes being sent.

use axum::{
    body::Body,
    http::{header, HeaderValue, Method},
    response::Response,
};
use bytes::Bytes;
use camgate_core::config::WhepPathStyle;
use camgate_core::{Error, Origin, Result};
use tracing::{info, warn};

use crate::{percent_encode, validate_stream_name};

pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Answer headers the browser needs to manage the session afterwards.
const PASSTHROUGH_HEADERS: [header::HeaderName; 5] = [
    header::CONTENT_TYPE,
    header::LOCATION,
    header::ETAG,
    header::LINK,
    header::HeaderName::from_static("accept-patch"),
];

#[derive(Clone)]
pub struct SdpRelay {
    client: reqwest::Client,
    style: WhepPathStyle,
}

impl SdpRelay {
    #[must_use]
    pub const fn new(client: reqwest::Client, style: WhepPathStyle) -> Self {
        Self { client, style }
    }

    #[must_use]
    pub const fn style(&self) -> WhepPathStyle {
        self.style
    }

    /// Upstream URL for a stream's offer endpoint.
    #[must_use]
    pub fn offer_url(&self, origin: &Origin, name: &str) -> String {
        origin.join(&self.style.template().replace("{name}", &percent_encode(name)))
    }

    /// Upstream URL for an established session resource. Sessions always
    /// live under `/{name}/whep/{session}` regardless of the offer style.
    #[must_use]
    pub fn session_url(origin: &Origin, name: &str, session: &str) -> String {
        origin.join(&format!("/{}/whep/{}", percent_encode(name), percent_encode(session)))
    }

    /// Forward an SDP offer and return the media server's answer as is.
    pub async fn relay(&self, origin: &Origin, name: &str, offer: Bytes) -> Result<Response> {
        validate_stream_name(name)?;
        if offer.is_empty() {
            return Err(Error::InvalidInput("missing SDP offer".to_string()));
        }

        let target = self.offer_url(origin, name);
        info!(stream = name, target = %target, bytes = offer.len(), "Relaying WHEP offer");

        let request = self
            .client
            .post(&target)
            .header(header::CONTENT_TYPE, SDP_CONTENT_TYPE);

        let response = send_exact(request, offer).await.map_err(|e| {
            warn!(stream = name, target = %target, "WHEP upstream unreachable: {e}");
            e
        })?;

        info!(stream = name, status = response.status().as_u16(), "WHEP answer received");
        answer_response(response).await
    }

    /// Forward a trickle-ICE `PATCH` or teardown `DELETE` for a session.
    pub async fn relay_session(
        &self,
        origin: &Origin,
        name: &str,
        session: &str,
        method: Method,
        content_type: Option<&HeaderValue>,
        body: Bytes,
    ) -> Result<Response> {
        validate_stream_name(name)?;
        validate_stream_name(session)?;
        if method != Method::PATCH && method != Method::DELETE {
            return Err(Error::InvalidInput(format!("Unsupported session method: {method}")));
        }

        let target = Self::session_url(origin, name, session);
        info!(stream = name, session, %method, bytes = body.len(), "Relaying WHEP session request");

        let mut request = self.client.request(method, &target);
        if let Some(ct) = content_type {
            request = request.header(header::CONTENT_TYPE, ct.as_bytes());
        }

        let response = send_exact(request, body).await.map_err(|e| {
            warn!(stream = name, session, "WHEP session upstream unreachable: {e}");
            e
        })?;

        answer_response(response).await
    }
}

/// Send `body` with a `Content-Length` computed from the bytes themselves.
async fn send_exact(request: reqwest::RequestBuilder, body: Bytes) -> Result<reqwest::Response> {
    let response = request
        .header(header::CONTENT_LENGTH, body.len())
        .body(body)
        .send()
        .await?;
    Ok(response)
}

/// Mirror the upstream status, session headers and body.
async fn answer_response(response: reqwest::Response) -> Result<Response> {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?;

    let mut builder = Response::builder()
        .status(status)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Expose-Headers", "*");

    for name in &PASSTHROUGH_HEADERS {
        if let Some(value) = headers.get(name) {
            builder = builder.header(name, value);
        }
    }

    builder
        .body(Body::from(body))
        .map_err(|e| Error::Internal(format!("Failed to build WHEP response: {e}")))
}
