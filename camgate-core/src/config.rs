use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::upstream::Origin;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub media: MediaConfig,
    pub ptz: PtzConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the browser frontend. Served for unmatched GETs.
    pub static_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3100,
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Where the gateway runs relative to the media server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Same network as the media server; client overrides are ignored
    #[default]
    Local,
    /// Behind a tunnel whose public endpoint may rotate
    Remote,
}

impl StreamMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

/// Upstream WHEP addressing scheme. The media server changed its layout
/// between releases; one style is chosen per deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WhepPathStyle {
    /// `/{name}/whep` (current media server releases)
    #[default]
    NameSegment,
    /// `/whep?path={name}` (older releases)
    QueryParam,
}

impl WhepPathStyle {
    /// All known styles, newest first.
    pub const ALL: [Self; 2] = [Self::NameSegment, Self::QueryParam];

    /// Path template; `{name}` is replaced by the percent-encoded stream name.
    #[must_use]
    pub const fn template(self) -> &'static str {
        match self {
            Self::NameSegment => "/{name}/whep",
            Self::QueryParam => "/whep?path={name}",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NameSegment => "name-segment",
            Self::QueryParam => "query-param",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub mode: StreamMode,
    /// Media server HLS origin
    pub hls_origin: String,
    /// Media server WebRTC (WHEP) origin
    pub whep_origin: String,
    pub whep_path_style: WhepPathStyle,
    /// Total timeout for signaling and master-playlist fetches
    pub request_timeout_secs: u64,
    /// Connect timeout for long-lived segment proxy connections
    pub connect_timeout_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            mode: StreamMode::Local,
            hls_origin: "http://127.0.0.1:8888".to_string(),
            whep_origin: "http://127.0.0.1:8889".to_string(),
            whep_path_style: WhepPathStyle::NameSegment,
            request_timeout_secs: 5,
            connect_timeout_secs: 5,
        }
    }
}

impl MediaConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// How PTZ commands reach the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PtzTransportKind {
    /// HTTP request with credentials embedded in the command URL
    #[default]
    Http,
    /// External program that handles the device's challenge-response auth
    Exec,
}

impl PtzTransportKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Exec => "exec",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecTransportConfig {
    pub program: String,
    /// Argument templates. `{user}`, `{password}`, `{url}` and `{timeout}`
    /// are substituted per command.
    pub args: Vec<String>,
}

impl Default for ExecTransportConfig {
    fn default() -> Self {
        Self {
            program: "curl".to_string(),
            args: [
                "-s",
                "--max-time",
                "{timeout}",
                "--digest",
                "-u",
                "{user}:{password}",
                "{url}",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PtzConfig {
    pub transport: PtzTransportKind,
    /// Credential pair shared by every camera
    pub username: String,
    pub password: String,
    pub channel: u32,
    pub default_speed: u8,
    pub timeout_secs: u64,
    pub exec: ExecTransportConfig,
    /// Camera name to device address (host or host:port)
    pub cameras: BTreeMap<String, String>,
}

impl Default for PtzConfig {
    fn default() -> Self {
        Self {
            transport: PtzTransportKind::Http,
            username: String::new(),
            password: String::new(),
            channel: 1,
            default_speed: 4,
            timeout_secs: 5,
            exec: ExecTransportConfig::default(),
            cameras: BTreeMap::new(),
        }
    }
}

impl PtzConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Environment names used by existing deployments, applied on top of the
/// structured configuration.
const LEGACY_CAMERA_VARS: [(&str, &str); 3] = [
    ("ROBOT_CAM_IP", "robot"),
    ("TABLE_CAM_IP", "table"),
    ("CEILING_CAM_IP", "ceiling"),
];

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Legacy environment names (`PORT`, `CAM_USER`, `MEDIAMTX_HTTP`, ...)
    /// 2. Environment variables (`CAMGATE__SERVER__PORT`, ...)
    /// 3. Config file (if provided)
    /// 4. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("CAMGATE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: Self = builder.build()?.try_deserialize()?;
        config.apply_legacy_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay the flat environment names older deployments set.
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = non_empty("PORT").and_then(|p| p.trim().parse().ok()) {
            self.server.port = port;
        }
        if let Some(user) = non_empty("CAM_USER") {
            self.ptz.username = user;
        }
        if let Some(pass) = non_empty("CAM_PASS") {
            self.ptz.password = pass;
        }
        for (var, camera) in LEGACY_CAMERA_VARS {
            if let Some(address) = non_empty(var) {
                self.ptz.cameras.insert(camera.to_string(), address.trim().to_string());
            }
        }
        if let Some(origin) = non_empty("MEDIAMTX_HTTP") {
            self.media.hls_origin = origin;
        }
        if let Some(origin) = non_empty("MEDIAMTX_WHEP") {
            self.media.whep_origin = origin;
        }
        match non_empty("STREAM_MODE").as_deref().map(str::trim) {
            Some("remote") => self.media.mode = StreamMode::Remote,
            Some("local") => self.media.mode = StreamMode::Local,
            _ => {}
        }
    }

    /// Check for misconfigurations, returning every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if Origin::parse(&self.media.hls_origin).is_none() {
            errors.push(format!(
                "media.hls_origin must be an absolute http(s) origin, got '{}'",
                self.media.hls_origin
            ));
        }
        if Origin::parse(&self.media.whep_origin).is_none() {
            errors.push(format!(
                "media.whep_origin must be an absolute http(s) origin, got '{}'",
                self.media.whep_origin
            ));
        }
        if self.media.request_timeout_secs == 0 {
            errors.push("media.request_timeout_secs must be greater than 0".to_string());
        }
        if self.ptz.timeout_secs == 0 {
            errors.push("ptz.timeout_secs must be greater than 0".to_string());
        }
        if !(1..=8).contains(&self.ptz.default_speed) {
            errors.push(format!(
                "ptz.default_speed must be between 1 and 8, got {}",
                self.ptz.default_speed
            ));
        }
        if !self.ptz.cameras.is_empty() && self.ptz.username.is_empty() {
            errors.push("ptz.username is required when cameras are configured".to_string());
        }
        for (name, address) in &self.ptz.cameras {
            if address.trim().is_empty() {
                errors.push(format!("ptz.cameras.{name} has an empty address"));
            }
        }
        if self.ptz.transport == PtzTransportKind::Exec && self.ptz.exec.program.trim().is_empty() {
            errors.push("ptz.exec.program is required for the exec transport".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get HTTP listen address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
