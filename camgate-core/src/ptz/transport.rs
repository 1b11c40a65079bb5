//! Command transports
//!
//! Two interchangeable ways of delivering a [`DeviceCommand`]:
//!
//! - [`HttpTransport`] sends the request itself, with the credentials in the
//!   URL. Success is an HTTP 2xx.
//! - [`ExecTransport`] hands the URL to an external program (curl with
//!   `--digest` by default) for devices that insist on challenge-response
//!   auth. Success is the literal `OK` token in the program's output.
//!
//! One transport is selected at startup; requests never mix them.

use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, warn};

use super::camera::{Credentials, Device};
use super::command::DeviceCommand;
use crate::config::{ExecTransportConfig, PtzConfig, PtzTransportKind};
use crate::error::{Error, Result};

/// Reply token the device sends on success
pub const SUCCESS_TOKEN: &str = "OK";

/// How far a command got
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Accepted,
    Rejected,
    Unreachable,
}

/// Outcome of one primitive command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReply {
    pub delivery: Delivery,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandReply {
    #[must_use]
    pub fn accepted(status: Option<u16>, result: String) -> Self {
        Self {
            delivery: Delivery::Accepted,
            status,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn rejected(status: Option<u16>, result: String, error: Option<String>) -> Self {
        Self {
            delivery: Delivery::Rejected,
            status,
            result: Some(result),
            error,
        }
    }

    #[must_use]
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self {
            delivery: Delivery::Unreachable,
            status: None,
            result: None,
            error: Some(reason.into()),
        }
    }

    #[must_use]
    pub fn ok(&self) -> bool {
        self.delivery == Delivery::Accepted
    }

    /// HTTP status to report for this reply: 200 when accepted, the device's
    /// own status when it rejected over HTTP, 502 otherwise.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match (self.delivery, self.status) {
            (Delivery::Accepted, _) => 200,
            (Delivery::Rejected, Some(status)) if status >= 400 => status,
            _ => 502,
        }
    }
}

/// Outcome of fetching a still image from a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotReply {
    pub delivery: Delivery,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Bytes received
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SnapshotReply {
    #[must_use]
    pub const fn received(status: Option<u16>, size: usize) -> Self {
        Self {
            delivery: Delivery::Accepted,
            status,
            size,
            error: None,
        }
    }

    #[must_use]
    pub fn rejected(status: Option<u16>, size: usize, error: impl Into<String>) -> Self {
        Self {
            delivery: Delivery::Rejected,
            status,
            size,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self {
            delivery: Delivery::Unreachable,
            status: None,
            size: 0,
            error: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Short name for logs and health output
    fn name(&self) -> &'static str;

    /// Deliver one command. Never fails: every outcome is a [`CommandReply`].
    async fn send(&self, device: &Device, command: &DeviceCommand) -> CommandReply;

    /// Fetch the device's still image through the same channel commands use.
    async fn snapshot(&self, device: &Device) -> SnapshotReply;
}

/// Build the transport selected in configuration.
pub fn transport_from_config(config: &PtzConfig) -> Result<Arc<dyn CommandTransport>> {
    let credentials = Credentials::new(&config.username, &config.password);
    let transport: Arc<dyn CommandTransport> = match config.transport {
        PtzTransportKind::Http => Arc::new(HttpTransport::new(credentials, config.timeout())?),
        PtzTransportKind::Exec => Arc::new(ExecTransport::new(
            credentials,
            config.exec.clone(),
            config.timeout(),
        )?),
    };
    Ok(transport)
}

// ------------------------------------------------------------------
// Direct HTTP
// ------------------------------------------------------------------

pub struct HttpTransport {
    client: reqwest::Client,
    credentials: Credentials,
}

impl HttpTransport {
    pub fn new(credentials: Credentials, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build PTZ HTTP client: {e}")))?;
        Ok(Self { client, credentials })
    }
}

#[async_trait]
impl CommandTransport for HttpTransport {
    fn name(&self) -> &'static str {
        PtzTransportKind::Http.as_str()
    }

    async fn send(&self, device: &Device, command: &DeviceCommand) -> CommandReply {
        let url = match command.url(device, Some(&self.credentials)) {
            Ok(url) => url,
            Err(e) => return CommandReply::unreachable(e.to_string()),
        };

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                // The URL carries credentials; keep it out of logs and replies.
                let e = e.without_url();
                warn!(camera = %device.name, code = %command.code, "PTZ request failed: {}", e);
                return CommandReply::unreachable(e.to_string());
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(camera = %device.name, code = %command.code, status = status.as_u16(), "PTZ reply");

        if status.is_success() {
            CommandReply::accepted(Some(status.as_u16()), body)
        } else {
            CommandReply::rejected(Some(status.as_u16()), body, None)
        }
    }

    async fn snapshot(&self, device: &Device) -> SnapshotReply {
        let url = match device.snapshot_url(Some(&self.credentials)) {
            Ok(url) => url,
            Err(e) => return SnapshotReply::unreachable(e.to_string()),
        };

        let result = match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                response.bytes().await.map(|body| (status, body.len()))
            }
            Err(e) => Err(e),
        };

        match result {
            Ok((status, size)) if status.is_success() => {
                SnapshotReply::received(Some(status.as_u16()), size)
            }
            Ok((status, size)) => SnapshotReply::rejected(
                Some(status.as_u16()),
                size,
                format!("device returned {status}"),
            ),
            Err(e) => {
                let e = e.without_url();
                warn!(camera = %device.name, "Snapshot request failed: {}", e);
                SnapshotReply::unreachable(e.to_string())
            }
        }
    }
}

// ------------------------------------------------------------------
// External program
// ------------------------------------------------------------------

pub struct ExecTransport {
    credentials: Credentials,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ExecTransport {
    pub fn new(
        credentials: Credentials,
        config: ExecTransportConfig,
        timeout: Duration,
    ) -> Result<Self> {
        if config.program.trim().is_empty() {
            return Err(Error::Config("ptz.exec.program is empty".to_string()));
        }
        Ok(Self {
            credentials,
            program: config.program,
            args: config.args,
            timeout,
        })
    }

    fn render_args(&self, url: &str) -> Vec<String> {
        let timeout = self.timeout.as_secs().max(1).to_string();
        let vars = [
            ("user", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
            ("url", url),
            ("timeout", timeout.as_str()),
        ];
        self.args.iter().map(|arg| expand_placeholders(arg, &vars)).collect()
    }

    /// Run the program against `url`. The error is a reason fit for a reply.
    async fn run(&self, device: &Device, url: &str) -> std::result::Result<Output, String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.render_args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // The program enforces its own timeout; this bounds a hung process.
        let grace = self.timeout + Duration::from_secs(1);
        match tokio::time::timeout(grace, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => {
                warn!(
                    camera = %device.name,
                    program = %self.program,
                    "Failed to run device command: {}", e
                );
                Err(format!("failed to run {}: {e}", self.program))
            }
            Err(_) => {
                warn!(camera = %device.name, program = %self.program, "Device command timed out");
                Err(format!("{} timed out", self.program))
            }
        }
    }
}

/// Expand `{name}` placeholders in a single pass. Substituted values are
/// never scanned again and unknown placeholders are kept as written.
fn expand_placeholders(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let hit = vars.iter().find_map(|(name, value)| {
            tail[1..]
                .strip_prefix(*name)
                .and_then(|after| after.strip_prefix('}'))
                .map(|after| (*value, after))
        });
        match hit {
            Some((value, after)) => {
                out.push_str(value);
                rest = after;
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[async_trait]
impl CommandTransport for ExecTransport {
    fn name(&self) -> &'static str {
        PtzTransportKind::Exec.as_str()
    }

    async fn send(&self, device: &Device, command: &DeviceCommand) -> CommandReply {
        let url = match command.url(device, None) {
            Ok(url) => url,
            Err(e) => return CommandReply::unreachable(e.to_string()),
        };

        let output = match self.run(device, url.as_str()).await {
            Ok(output) => output,
            Err(reason) => return CommandReply::unreachable(reason),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!(
            camera = %device.name,
            code = %command.code,
            exit = ?output.status.code(),
            "PTZ command finished"
        );

        if stdout.trim() == SUCCESS_TOKEN {
            return CommandReply::accepted(None, stdout);
        }

        let error = if stderr.is_empty() {
            match output.status.code() {
                Some(0) => None,
                Some(code) => Some(format!("{} exited with status {code}", self.program)),
                None => Some(format!("{} terminated by signal", self.program)),
            }
        } else {
            Some(stderr)
        };
        CommandReply::rejected(None, stdout, error)
    }

    async fn snapshot(&self, device: &Device) -> SnapshotReply {
        let url = match device.snapshot_url(None) {
            Ok(url) => url,
            Err(e) => return SnapshotReply::unreachable(e.to_string()),
        };

        let output = match self.run(device, url.as_str()).await {
            Ok(output) => output,
            Err(reason) => return SnapshotReply::unreachable(reason),
        };

        let size = output.stdout.len();
        debug!(
            camera = %device.name,
            size,
            exit = ?output.status.code(),
            "Snapshot command finished"
        );

        if output.status.success() {
            return SnapshotReply::received(None, size);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let error = if stderr.is_empty() {
            format!("{} exited with {}", self.program, output.status)
        } else {
            stderr
        };
        SnapshotReply::rejected(None, size, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ptz::command::MotionCode;
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn device_at(address: &str) -> Device {
        Device {
            name: "robot".to_string(),
            address: address.to_string(),
        }
    }

    fn http_transport() -> HttpTransport {
        HttpTransport::new(Credentials::new("admin", "secret"), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_reply_http_status() {
        assert_eq!(CommandReply::accepted(Some(200), "OK".into()).http_status(), 200);
        assert_eq!(CommandReply::rejected(Some(401), String::new(), None).http_status(), 401);
        assert_eq!(CommandReply::rejected(None, "Error".into(), None).http_status(), 502);
        assert_eq!(CommandReply::unreachable("refused").http_status(), 502);
    }

    #[tokio::test]
    async fn test_http_transport_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/ptz.cgi"))
            .and(query_param("action", "start"))
            .and(query_param("code", "Up"))
            .and(query_param("arg2", "4"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK\r\n"))
            .expect(1)
            .mount(&server)
            .await;

        let device = device_at(&server.address().to_string());
        let reply = http_transport()
            .send(&device, &DeviceCommand::start(1, MotionCode::Up, 4))
            .await;

        assert!(reply.ok());
        assert_eq!(reply.status, Some(200));
    }

    #[tokio::test]
    async fn test_http_transport_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let device = device_at(&server.address().to_string());
        let reply = http_transport()
            .send(&device, &DeviceCommand::halt(1, MotionCode::Down))
            .await;

        assert_eq!(reply.delivery, Delivery::Rejected);
        assert_eq!(reply.http_status(), 401);
        assert_eq!(reply.result.as_deref(), Some("Unauthorized"));
    }

    #[tokio::test]
    async fn test_http_transport_unreachable() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let reply = http_transport()
            .send(&device_at(&address), &DeviceCommand::start(1, MotionCode::Left, 2))
            .await;

        assert_eq!(reply.delivery, Delivery::Unreachable);
        assert_eq!(reply.http_status(), 502);
        assert!(reply.error.is_some());
        // Credentials never leak into the reported error.
        assert!(!reply.error.unwrap().contains("secret"));
    }

    #[test]
    fn test_exec_render_args() {
        let transport = ExecTransport::new(
            Credentials::new("admin", "secret"),
            ExecTransportConfig::default(),
            Duration::from_secs(3),
        )
        .unwrap();

        let args = transport.render_args("http://10.0.0.1/cgi-bin/ptz.cgi?action=stop");
        assert_eq!(
            args,
            vec![
                "-s",
                "--max-time",
                "3",
                "--digest",
                "-u",
                "admin:secret",
                "http://10.0.0.1/cgi-bin/ptz.cgi?action=stop",
            ]
        );
    }

    #[test]
    fn test_exec_render_args_single_pass() {
        let transport = ExecTransport::new(
            Credentials::new("{password}", "a{url}b{timeout}{"),
            ExecTransportConfig {
                program: "curl".to_string(),
                args: vec![
                    "{user}:{password}".to_string(),
                    "{url}".to_string(),
                    "{host} {timeout}s {".to_string(),
                ],
            },
            Duration::from_secs(5),
        )
        .unwrap();

        let args = transport.render_args("http://10.0.0.1/{timeout}");
        assert_eq!(
            args,
            vec![
                "{password}:a{url}b{timeout}{",
                "http://10.0.0.1/{timeout}",
                "{host} 5s {",
            ]
        );
    }

    #[test]
    fn test_exec_requires_program() {
        let config = ExecTransportConfig {
            program: "  ".to_string(),
            args: vec![],
        };
        let result = ExecTransport::new(Credentials::default(), config, Duration::from_secs(1));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_http_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/snapshot.cgi"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF; 2048]))
            .expect(1)
            .mount(&server)
            .await;

        let reply = http_transport()
            .snapshot(&device_at(&server.address().to_string()))
            .await;
        assert_eq!(reply, SnapshotReply::received(Some(200), 2048));
    }

    #[tokio::test]
    async fn test_http_snapshot_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let reply = http_transport()
            .snapshot(&device_at(&server.address().to_string()))
            .await;
        assert_eq!(reply.delivery, Delivery::Rejected);
        assert_eq!(reply.status, Some(401));
        assert_eq!(reply.size, 12);
    }

    #[cfg(unix)]
    fn exec_transport(program: &str, args: &[&str]) -> ExecTransport {
        ExecTransport::new(
            Credentials::new("admin", "secret"),
            ExecTransportConfig {
                program: program.to_string(),
                args: args.iter().map(ToString::to_string).collect(),
            },
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_transport_ok_token() {
        let transport = exec_transport("printf", &["OK\\r\\n"]);
        let reply = transport
            .send(&device_at("10.0.0.1"), &DeviceCommand::start(1, MotionCode::Up, 4))
            .await;
        assert!(reply.ok());
        assert_eq!(reply.status, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_transport_requires_exact_token() {
        // Exit status 0 alone is not success.
        let transport = exec_transport("printf", &["Error: Bad Request"]);
        let reply = transport
            .send(&device_at("10.0.0.1"), &DeviceCommand::start(1, MotionCode::Up, 4))
            .await;
        assert_eq!(reply.delivery, Delivery::Rejected);
        assert_eq!(reply.http_status(), 502);

        let transport = exec_transport("printf", &["OKAY"]);
        let reply = transport
            .send(&device_at("10.0.0.1"), &DeviceCommand::start(1, MotionCode::Up, 4))
            .await;
        assert!(!reply.ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_transport_receives_url() {
        let script = "case \"$1\" in *code=Right*) echo OK;; *) echo NO;; esac";
        let transport = exec_transport("sh", &["-c", script, "sh", "{url}"]);
        let reply = transport
            .send(&device_at("10.0.0.1"), &DeviceCommand::halt(1, MotionCode::Right))
            .await;
        assert!(reply.ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_transport_missing_program() {
        let transport = exec_transport("/nonexistent/ptz-helper", &[]);
        let reply = transport
            .send(&device_at("10.0.0.1"), &DeviceCommand::halt(1, MotionCode::Up))
            .await;
        assert_eq!(reply.delivery, Delivery::Unreachable);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_snapshot_counts_output() {
        let script = "case \"$1\" in */cgi-bin/snapshot.cgi) head -c 1500 /dev/zero;; esac";
        let transport = exec_transport("sh", &["-c", script, "sh", "{url}"]);
        let reply = transport.snapshot(&device_at("10.0.0.1")).await;
        assert_eq!(reply, SnapshotReply::received(None, 1500));

        let transport = exec_transport("sh", &["-c", "echo denied >&2; exit 7"]);
        let reply = transport.snapshot(&device_at("10.0.0.1")).await;
        assert_eq!(reply.delivery, Delivery::Rejected);
        assert_eq!(reply.error.as_deref(), Some("denied"));
    }
}
