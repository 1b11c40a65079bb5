//! Media server endpoints
//!
//! WHEP signaling (offer and session resources) and HLS playback. Upstream
//! failures are reported the way a reverse proxy would: the media server's
//! own error status and body verbatim, or a bare `502 bad gateway`.

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use camgate_core::upstream::BASE_HEADER;
use camgate_core::{Error, MediaService, Origin, UpstreamOverride};
use camgate_proxy::playlist::MASTER_PLAYLIST;
use camgate_proxy::proxy_options_preflight;

use crate::http::error::AppError;
use crate::http::AppState;

pub fn create_media_router() -> Router<AppState> {
    Router::new()
        // Signaling
        .route("/whep", post(whep_offer_query).options(proxy_options_preflight))
        .route("/whep/{name}", post(whep_offer).options(proxy_options_preflight))
        .route("/{name}/whep", post(whep_offer).options(proxy_options_preflight))
        .route(
            "/whep/{name}/{session}",
            axum::routing::patch(whep_session)
                .delete(whep_session)
                .options(proxy_options_preflight),
        )
        .route(
            "/{name}/whep/{session}",
            axum::routing::patch(whep_session)
                .delete(whep_session)
                .options(proxy_options_preflight),
        )
        // Playback
        .route("/hls/{name}/{*rest}", get(hls).options(proxy_options_preflight))
}

/// Query parameters understood by the media routes. Anything else is
/// ignored here and forwarded where applicable.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MediaQuery {
    /// Upstream override (remote mode only)
    pub base: Option<String>,
    /// Stream name for `POST /whep?path=<name>`
    pub path: Option<String>,
}

impl MediaQuery {
    /// The first occurrence of a repeated key wins. Parsing never fails.
    pub fn parse(raw: Option<&str>) -> Self {
        let mut query = Self::default();
        let Some(raw) = raw else {
            return query;
        };
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            let slot = match key.as_ref() {
                "base" => &mut query.base,
                "path" => &mut query.path,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        query
    }
}

/// Upstream failure rendered as a proxy response
pub struct MediaError(Error);

impl From<Error> for MediaError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for MediaError {
    fn into_response(self) -> Response {
        match self.0 {
            Error::UpstreamRejected { status, body } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
                body,
            )
                .into_response(),
            Error::UpstreamUnreachable(msg) => {
                tracing::warn!("Media upstream unreachable: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
                    "bad gateway",
                )
                    .into_response()
            }
            other => AppError::from(other).into_response(),
        }
    }
}

type MediaResult = Result<Response, MediaError>;

fn resolve_origin(
    state: &AppState,
    service: MediaService,
    query: &MediaQuery,
    headers: &HeaderMap,
) -> Origin {
    let overrides = UpstreamOverride {
        query: query.base.as_deref(),
        header: headers.get(BASE_HEADER).and_then(|v| v.to_str().ok()),
    };
    state.resolver.resolve(service, overrides)
}

/// POST /whep?path=<name>
pub async fn whep_offer_query(
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    offer: Bytes,
) -> MediaResult {
    let query = MediaQuery::parse(raw_query.as_deref());
    let name = query
        .path
        .clone()
        .ok_or_else(|| Error::InvalidInput("path query parameter is required".to_string()))?;
    let origin = resolve_origin(&state, MediaService::Whep, &query, &headers);
    Ok(state.proxy.relay.relay(&origin, &name, offer).await?)
}

/// POST /whep/{name} and POST /{name}/whep
pub async fn whep_offer(
    State(state): State<AppState>,
    Path(name): Path<String>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    offer: Bytes,
) -> MediaResult {
    let query = MediaQuery::parse(raw_query.as_deref());
    let origin = resolve_origin(&state, MediaService::Whep, &query, &headers);
    Ok(state.proxy.relay.relay(&origin, &name, offer).await?)
}

/// PATCH|DELETE on a WHEP session resource
pub async fn whep_session(
    State(state): State<AppState>,
    Path((name, session)): Path<(String, String)>,
    RawQuery(raw_query): RawQuery,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> MediaResult {
    let query = MediaQuery::parse(raw_query.as_deref());
    let origin = resolve_origin(&state, MediaService::Whep, &query, &headers);
    Ok(state
        .proxy
        .relay
        .relay_session(
            &origin,
            &name,
            &session,
            method,
            headers.get(header::CONTENT_TYPE),
            body,
        )
        .await?)
}

/// GET /hls/{name}/index.m3u8 is rewritten, anything else under the
/// stream is streamed through.
pub async fn hls(
    State(state): State<AppState>,
    Path((name, rest)): Path<(String, String)>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
) -> MediaResult {
    let query = MediaQuery::parse(raw_query.as_deref());
    let origin = resolve_origin(&state, MediaService::Hls, &query, &headers);
    if rest == MASTER_PLAYLIST {
        return Ok(state.proxy.playlists.rewrite(&origin, &name).await?);
    }
    Ok(state
        .proxy
        .streams
        .forward(&origin, &name, &rest, raw_query.as_deref(), &headers)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_error_rendering() {
        let response = MediaError::from(Error::UpstreamRejected {
            status: 404,
            body: Bytes::from_static(b"no stream"),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response =
            MediaError::from(Error::UpstreamUnreachable("refused".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response = MediaError::from(Error::InvalidInput("bad name".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_media_query_tolerates_repeats() {
        assert_eq!(MediaQuery::parse(None), MediaQuery::default());

        let query = MediaQuery::parse(Some("base=not-a-url&base="));
        assert_eq!(query.base.as_deref(), Some("not-a-url"));
        assert_eq!(query.path, None);

        let raw = "path=robot&_HLS_msn=3&path=table&base=http%3A%2F%2Fh%3A1";
        let query = MediaQuery::parse(Some(raw));
        assert_eq!(query.path.as_deref(), Some("robot"));
        assert_eq!(query.base.as_deref(), Some("http://h:1"));

        let query = MediaQuery::parse(Some("base&=x&&"));
        assert_eq!(query.base.as_deref(), Some(""));
    }
}
