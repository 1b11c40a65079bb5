//! Media server proxy utilities
//!
//! WHEP signaling relay, HLS master playlist rewriting and transparent
//! segment/variant streaming. Used by the HTTP routes in `camgate-api`.

pub mod playlist;
pub mod stream;
pub mod whep;

use axum::{
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::IntoResponse,
};
use camgate_core::config::MediaConfig;
use camgate_core::{Error, Result};

pub use playlist::PlaylistRewriter;
pub use stream::StreamProxy;
pub use whep::SdpRelay;

/// Hop-by-hop and routing headers never forwarded to the media server.
const SKIPPED_REQUEST_HEADERS: [&str; 8] = [
    "host",
    "connection",
    "accept-encoding",
    "content-length",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    camgate_core::upstream::BASE_HEADER,
];

/// Hop-by-hop headers never copied back to the client.
const SKIPPED_RESPONSE_HEADERS: [&str; 5] = [
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-connection",
];

/// Every proxy in one place, built once at startup.
#[derive(Clone)]
pub struct MediaProxy {
    pub relay: SdpRelay,
    pub playlists: PlaylistRewriter,
    pub streams: StreamProxy,
}

impl MediaProxy {
    /// Build the bounded client (signaling, master playlists) and the
    /// streaming client (segments, variants). Streaming connections are
    /// long-lived, so only their connect phase is bounded.
    pub fn from_config(config: &MediaConfig) -> Result<Self> {
        let bounded = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;

        let streaming = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            relay: SdpRelay::new(bounded.clone(), config.whep_path_style),
            playlists: PlaylistRewriter::new(bounded),
            streams: StreamProxy::new(streaming),
        })
    }
}

/// Stream names are a single path segment of `[A-Za-z0-9._-]`.
pub fn validate_stream_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("Invalid stream name: {name:?}")))
    }
}

/// Copy client headers worth forwarding onto an upstream request.
pub(crate) fn forward_client_headers(
    mut request: reqwest::RequestBuilder,
    client_headers: &HeaderMap,
) -> reqwest::RequestBuilder {
    for (name, value) in client_headers {
        if SKIPPED_REQUEST_HEADERS.contains(&name.as_str()) {
            continue;
        }
        request = request.header(name.as_str(), value.as_bytes());
    }
    request
}

/// Whether an upstream response header may be copied to the client.
pub(crate) fn is_forwardable_response_header(name: &HeaderName) -> bool {
    !SKIPPED_RESPONSE_HEADERS.contains(&name.as_str())
        && !name.as_str().starts_with("access-control-")
        && *name != header::CACHE_CONTROL
        && *name != header::PRAGMA
        && *name != header::EXPIRES
}

/// Headers that keep intermediaries from caching live media and let any
/// origin read it.
pub(crate) const NO_CACHE_CORS_HEADERS: [(&str, &str); 5] = [
    ("Cache-Control", "no-cache, no-store, must-revalidate"),
    ("Pragma", "no-cache"),
    ("Expires", "0"),
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Expose-Headers", "*"),
];

/// Preflight handler suitable for `OPTIONS` routes.
#[allow(clippy::unused_async)]
pub async fn proxy_options_preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            ("Access-Control-Allow-Origin", "*"),
            ("Access-Control-Allow-Methods", "GET, HEAD, POST, PATCH, DELETE, OPTIONS"),
            ("Access-Control-Allow-Headers", "*"),
            ("Access-Control-Expose-Headers", "*"),
            ("Access-Control-Max-Age", "86400"),
        ],
    )
}

/// Minimal percent-encoding for URL path segments and query values.
#[must_use]
pub fn percent_encode(input: &str) -> String {
    use std::fmt::Write;
    let mut result = String::with_capacity(input.len() * 2);
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                let _ = write!(result, "%{byte:02X}");
            }
        }
    }
    result
}

/// Drop the upstream override parameter from a raw query string, keeping
/// every other pair byte-for-byte.
#[must_use]
pub fn strip_base_param(query: Option<&str>) -> Option<String> {
    let kept: Vec<&str> = query?
        .split('&')
        .filter(|pair| {
            let key = pair.split_once('=').map_or(*pair, |(k, _)| k);
            !pair.is_empty() && key != camgate_core::upstream::BASE_QUERY_PARAM
        })
        .collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept.join("&"))
    }
}
