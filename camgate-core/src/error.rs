use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown camera: {0}")]
    UnknownCamera(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Network, DNS, connect or timeout failure while talking to a device or
    /// the media server.
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// The upstream answered with its own error status. Status and body are
    /// carried untouched so they can be passed through.
    #[error("Upstream rejected request with status {status}")]
    UpstreamRejected { status: u16, body: Bytes },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::Internal(format!("Failed to build upstream request: {err}"))
        } else {
            Self::UpstreamUnreachable(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
