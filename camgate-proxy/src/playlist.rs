//! HLS master playlist rewriting
//!
//! The media server advertises an alternate audio rendition group that is
//! not actually muxed, and some players refuse to start when they cannot
//! negotiate it. The master playlist is fetched, the audio renditions and
//! every reference to them are removed, and the rest is passed through
//! untouched.

use std::borrow::Cow;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use camgate_core::{Error, Origin, Result};
use tracing::{debug, info, warn};

use crate::{validate_stream_name, NO_CACHE_CORS_HEADERS};

pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Well-known master playlist name under each stream path
pub const MASTER_PLAYLIST: &str = "index.m3u8";

const MEDIA_TAG: &str = "#EXT-X-MEDIA:";
const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF:";

#[derive(Clone)]
pub struct PlaylistRewriter {
    client: reqwest::Client,
}

impl PlaylistRewriter {
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch a stream's master playlist and strip its audio renditions.
    ///
    /// A non-success upstream status is returned as
    /// [`Error::UpstreamRejected`] with the body untouched.
    pub async fn rewrite(&self, origin: &Origin, name: &str) -> Result<Response> {
        validate_stream_name(name)?;
        let url = origin.join(&format!("/{name}/{MASTER_PLAYLIST}"));

        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!(stream = name, url = %url, "Master playlist fetch failed: {e}");
            Error::from(e)
        })?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            info!(stream = name, status = status.as_u16(), "Master playlist fetch rejected");
            return Err(Error::UpstreamRejected {
                status: status.as_u16(),
                body,
            });
        }

        let rewritten = match std::str::from_utf8(&body) {
            Ok(text) => Body::from(strip_audio_renditions(text)),
            Err(_) => {
                // Not a text playlist; hand it over unchanged.
                debug!(stream = name, "Master playlist is not UTF-8, passing through");
                Body::from(body)
            }
        };

        let mut builder = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE);
        for (name, value) in NO_CACHE_CORS_HEADERS {
            builder = builder.header(name, value);
        }

        builder
            .body(rewritten)
            .map_err(|e| Error::Internal(format!("Failed to build playlist response: {e}")))
    }
}

/// Remove `#EXT-X-MEDIA:TYPE=AUDIO` lines and the `AUDIO=` attribute of
/// `#EXT-X-STREAM-INF` lines. Every other line, including line endings and
/// ordering, is preserved.
#[must_use]
pub fn strip_audio_renditions(playlist: &str) -> String {
    let kept: Vec<Cow<'_, str>> = playlist
        .split('\n')
        .filter_map(|line| {
            let (content, cr) = line
                .strip_suffix('\r')
                .map_or((line, ""), |content| (content, "\r"));

            if let Some(attrs) = content.strip_prefix(MEDIA_TAG) {
                let is_audio = parse_attributes(attrs)
                    .iter()
                    .any(|a| a.key == "TYPE" && a.value == "AUDIO");
                return if is_audio { None } else { Some(Cow::Borrowed(line)) };
            }

            if let Some(attrs) = content.strip_prefix(STREAM_INF_TAG) {
                let parsed = parse_attributes(attrs);
                if parsed.iter().any(|a| a.key == "AUDIO") {
                    let remaining: Vec<&str> = parsed
                        .iter()
                        .filter(|a| a.key != "AUDIO")
                        .map(|a| a.raw)
                        .collect();
                    return Some(Cow::Owned(format!("{STREAM_INF_TAG}{}{cr}", remaining.join(","))));
                }
            }

            Some(Cow::Borrowed(line))
        })
        .collect();

    kept.join("\n")
}

/// One `KEY=VALUE` entry of an attribute list
struct Attribute<'a> {
    key: &'a str,
    value: &'a str,
    /// Exact source text of the entry
    raw: &'a str,
}

/// Split an attribute list on commas outside quoted strings.
fn parse_attributes(list: &str) -> Vec<Attribute<'_>> {
    let mut attrs = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;

    for (idx, ch) in list.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                attrs.push(Attribute::parse(&list[start..idx]));
                start = idx + 1;
            }
            _ => {}
        }
    }
    attrs.push(Attribute::parse(&list[start..]));

    attrs
}

impl<'a> Attribute<'a> {
    fn parse(raw: &'a str) -> Self {
        let (key, value) = raw.split_once('=').unwrap_or((raw, ""));
        Self {
            key: key.trim(),
            value: value.trim(),
            raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MASTER: &str = "#EXTM3U\n\
#EXT-X-VERSION:9\n\
#EXT-X-INDEPENDENT-SEGMENTS\n\
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aac\",NAME=\"audio\",AUTOSELECT=YES,DEFAULT=YES,URI=\"audio.m3u8\"\n\
#EXT-X-STREAM-INF:BANDWIDTH=1628000,CODECS=\"avc1.64001f,mp4a.40.2\",RESOLUTION=1280x720,FRAME-RATE=25.000,AUDIO=\"aac\"\n\
video1_stream.m3u8\n";

    #[test]
    fn test_strip_audio_renditions() {
        let expected = "#EXTM3U\n\
#EXT-X-VERSION:9\n\
#EXT-X-INDEPENDENT-SEGMENTS\n\
#EXT-X-STREAM-INF:BANDWIDTH=1628000,CODECS=\"avc1.64001f,mp4a.40.2\",RESOLUTION=1280x720,FRAME-RATE=25.000\n\
video1_stream.m3u8\n";
        assert_eq!(strip_audio_renditions(MASTER), expected);
    }

    #[test]
    fn test_strip_multiple_variants_preserves_order() {
        let input = "#EXTM3U\n\
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"a1\",NAME=\"en\",URI=\"en.m3u8\"\n\
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"a1\",NAME=\"de\",URI=\"de.m3u8\"\n\
#EXT-X-MEDIA:TYPE=SUBTITLES,GROUP-ID=\"subs\",NAME=\"en\",URI=\"subs.m3u8\"\n\
#EXT-X-STREAM-INF:AUDIO=\"a1\",BANDWIDTH=800000,SUBTITLES=\"subs\"\n\
low.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=2400000,AUDIO=\"a1\",RESOLUTION=1920x1080\n\
high.m3u8\n";

        let out = strip_audio_renditions(input);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(
            lines,
            vec![
                "#EXTM3U",
                "#EXT-X-MEDIA:TYPE=SUBTITLES,GROUP-ID=\"subs\",NAME=\"en\",URI=\"subs.m3u8\"",
                "#EXT-X-STREAM-INF:BANDWIDTH=800000,SUBTITLES=\"subs\"",
                "low.m3u8",
                "#EXT-X-STREAM-INF:BANDWIDTH=2400000,RESOLUTION=1920x1080",
                "high.m3u8",
            ]
        );
        assert!(!out.contains("TYPE=AUDIO"));
        assert!(!out.contains("AUDIO=\"a1\""));
    }

    #[test]
    fn test_strip_keeps_crlf_line_endings() {
        let input = "#EXTM3U\r\n\
                     #EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aac\"\r\n\
                     #EXT-X-STREAM-INF:BANDWIDTH=1,AUDIO=\"aac\"\r\n\
                     v.m3u8\r\n";
        assert_eq!(
            strip_audio_renditions(input),
            "#EXTM3U\r\n#EXT-X-STREAM-INF:BANDWIDTH=1\r\nv.m3u8\r\n"
        );
    }

    #[test]
    fn test_strip_is_identity_without_audio() {
        let input = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1,CODECS=\"avc1.64001f\"\nstream.m3u8";
        assert_eq!(strip_audio_renditions(input), input);
        assert_eq!(strip_audio_renditions(""), "");
    }

    #[test]
    fn test_parse_attributes_respects_quotes() {
        let attrs = parse_attributes("BANDWIDTH=1,CODECS=\"avc1,mp4a\",AUDIO=\"aac\"");
        let keys: Vec<&str> = attrs.iter().map(|a| a.key).collect();
        assert_eq!(keys, vec!["BANDWIDTH", "CODECS", "AUDIO"]);
        assert_eq!(attrs[1].raw, "CODECS=\"avc1,mp4a\"");
    }

    #[tokio::test]
    async fn test_rewrite_fetches_and_sets_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robot/index.m3u8"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("cache-control", "max-age=30")
                    .set_body_string(MASTER),
            )
            .expect(1)
            .mount(&server)
            .await;

        let rewriter = PlaylistRewriter::new(reqwest::Client::new());
        let response = rewriter
            .rewrite(&Origin::parse(&server.uri()).unwrap(), "robot")
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], PLAYLIST_CONTENT_TYPE);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = std::str::from_utf8(&body).unwrap();
        assert!(!text.contains("#EXT-X-MEDIA:TYPE=AUDIO"));
        assert!(text.contains("RESOLUTION=1280x720,FRAME-RATE=25.000\n"));
    }

    #[tokio::test]
    async fn test_rewrite_passes_error_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("stream not found"))
            .mount(&server)
            .await;

        let rewriter = PlaylistRewriter::new(reqwest::Client::new());
        let err = rewriter
            .rewrite(&Origin::parse(&server.uri()).unwrap(), "robot")
            .await
            .unwrap_err();

        match err {
            Error::UpstreamRejected { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(&body[..], b"stream not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
