//! Upstream media-server origin selection
//!
//! In local mode the configured origins are always used. In remote mode the
//! tunnel endpoint may rotate, so the browser can point the gateway at the
//! current one through `?base=` or `X-Stream-Base`. Malformed overrides are
//! ignored rather than failing the request.

use std::fmt;

use tracing::debug;

use crate::config::{MediaConfig, StreamMode};
use crate::error::{Error, Result};

/// Query parameter carrying a per-request upstream override.
pub const BASE_QUERY_PARAM: &str = "base";

/// Header carrying a per-request upstream override.
pub const BASE_HEADER: &str = "x-stream-base";

/// An absolute `scheme://host[:port]` origin with no path, query or userinfo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin(String);

impl Origin {
    /// Parse and normalize an origin. Returns `None` for anything that is not
    /// an absolute http(s) URL with a host.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let parsed = url::Url::parse(trimmed).ok()?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return None;
        }
        parsed.host_str()?;
        if !parsed.username().is_empty() || parsed.password().is_some() {
            return None;
        }

        Some(Self(parsed.origin().ascii_serialization()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append an absolute path (with optional query) to this origin.
    #[must_use]
    pub fn join(&self, path_and_query: &str) -> String {
        if path_and_query.starts_with('/') {
            format!("{}{path_and_query}", self.0)
        } else {
            format!("{}/{path_and_query}", self.0)
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which backing service a proxied call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaService {
    /// HLS playlists and segments
    Hls,
    /// WHEP signaling
    Whep,
}

/// Client-supplied override candidates, highest priority first.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpstreamOverride<'a> {
    pub query: Option<&'a str>,
    pub header: Option<&'a str>,
}

/// Picks the media-server origin for each proxied request.
#[derive(Debug, Clone)]
pub struct UpstreamResolver {
    mode: StreamMode,
    hls: Origin,
    whep: Origin,
}

impl UpstreamResolver {
    pub fn new(mode: StreamMode, hls: Origin, whep: Origin) -> Self {
        Self { mode, hls, whep }
    }

    /// Build from the media configuration, rejecting malformed default origins.
    pub fn from_config(config: &MediaConfig) -> Result<Self> {
        let parse = |key: &str, value: &str| {
            Origin::parse(value).ok_or_else(|| {
                Error::Config(format!("media.{key} is not an http(s) origin: {value}"))
            })
        };
        let hls = parse("hls_origin", &config.hls_origin)?;
        let whep = parse("whep_origin", &config.whep_origin)?;
        Ok(Self::new(config.mode, hls, whep))
    }

    #[must_use]
    pub const fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Statically configured origin for a service.
    #[must_use]
    pub const fn default_origin(&self, service: MediaService) -> &Origin {
        match service {
            MediaService::Hls => &self.hls,
            MediaService::Whep => &self.whep,
        }
    }

    /// Resolve the origin for one request.
    #[must_use]
    pub fn resolve(&self, service: MediaService, overrides: UpstreamOverride<'_>) -> Origin {
        let fallback = self.default_origin(service);

        if self.mode == StreamMode::Local {
            return fallback.clone();
        }

        for (source, candidate) in [("query", overrides.query), ("header", overrides.header)] {
            let Some(raw) = candidate else { continue };
            match Origin::parse(raw) {
                Some(origin) => {
                    debug!(source, origin = %origin, "Using upstream override");
                    return origin;
                }
                None => {
                    debug!(source, value = raw, "Ignoring malformed upstream override");
                }
            }
        }

        fallback.clone()
    }
}
