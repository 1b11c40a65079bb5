pub mod config;
pub mod error;
pub mod logging;
pub mod ptz;
pub mod upstream;

pub use config::Config;
pub use error::{Error, Result};
pub use upstream::{MediaService, Origin, UpstreamOverride, UpstreamResolver};
