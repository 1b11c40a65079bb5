//! Segment and variant playlist streaming
//!
//! Everything under a stream path other than the master playlist is
//! forwarded as is. Bodies are piped chunk by chunk, never buffered.

use axum::{body::Body, http::HeaderMap, response::Response};
use camgate_core::{Error, Origin, Result};
use futures::TryStreamExt;
use tracing::{debug, warn};

use crate::{
    forward_client_headers, is_forwardable_response_header, percent_encode, strip_base_param,
    validate_stream_name, NO_CACHE_CORS_HEADERS,
};

#[derive(Clone)]
pub struct StreamProxy {
    client: reqwest::Client,
}

impl StreamProxy {
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Upstream URL for `rest` under a stream, with the override parameter
    /// removed from the query.
    pub fn target_url(
        origin: &Origin,
        name: &str,
        rest: &str,
        query: Option<&str>,
    ) -> Result<String> {
        validate_stream_name(name)?;
        let segments: Vec<&str> = rest.split('/').collect();
        if rest.is_empty()
            || segments
                .iter()
                .any(|s| s.is_empty() || *s == "." || *s == "..")
        {
            return Err(Error::InvalidInput(format!("Invalid media path: {rest:?}")));
        }

        let encoded: Vec<String> = segments.into_iter().map(percent_encode).collect();
        let mut url = origin.join(&format!("/{name}/{}", encoded.join("/")));
        if let Some(query) = strip_base_param(query) {
            url.push('?');
            url.push_str(&query);
        }
        Ok(url)
    }

    /// Forward a GET and stream the upstream body back with its status.
    pub async fn forward(
        &self,
        origin: &Origin,
        name: &str,
        rest: &str,
        query: Option<&str>,
        client_headers: &HeaderMap,
    ) -> Result<Response> {
        let url = Self::target_url(origin, name, rest, query)?;
        debug!(stream = name, url = %url, "Proxying media request");

        let request = forward_client_headers(self.client.get(&url), client_headers);
        let upstream = request.send().await.map_err(|e| {
            warn!(stream = name, url = %url, "Media upstream unreachable: {e}");
            Error::from(e)
        })?;

        let status = upstream.status();
        let headers = upstream.headers().clone();

        let mut builder = Response::builder().status(status);
        for (name, value) in &headers {
            if is_forwardable_response_header(name) {
                builder = builder.header(name, value);
            }
        }
        for (name, value) in NO_CACHE_CORS_HEADERS {
            builder = builder.header(name, value);
        }

        let stream_name = name.to_string();
        let body = upstream.bytes_stream().inspect_err(move |e| {
            warn!(stream = %stream_name, "Media stream interrupted: {e}");
        });

        builder
            .body(Body::from_stream(body))
            .map_err(|e| Error::Internal(format!("Failed to build media response: {e}")))
    }
}
