//! Camera name to device address mapping

use std::collections::BTreeMap;
use std::fmt;

use url::Url;

use crate::error::{Error, Result};

/// Camera used when a request does not name one.
pub const DEFAULT_CAMERA: &str = "robot";

/// Credential pair shared by every camera.
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A resolved camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    /// Host or host:port
    pub address: String,
}

impl Device {
    /// URL of a CGI script on the device. When `credentials` is given they
    /// are embedded in the URL authority.
    pub fn cgi_url(&self, script: &str, credentials: Option<&Credentials>) -> Result<Url> {
        let mut url = Url::parse(&format!("http://{}/cgi-bin/{script}", self.address)).map_err(|e| {
            Error::Config(format!(
                "Camera '{}' has an invalid address '{}': {e}",
                self.name, self.address
            ))
        })?;

        if let Some(creds) = credentials {
            url.set_username(&creds.username)
                .and_then(|()| url.set_password(Some(&creds.password)))
                .map_err(|()| {
                    Error::Config(format!("Cannot embed credentials for camera '{}'", self.name))
                })?;
        }

        Ok(url)
    }

    /// Still image endpoint, used to check that the device answers.
    pub fn snapshot_url(&self, credentials: Option<&Credentials>) -> Result<Url> {
        self.cgi_url("snapshot.cgi", credentials)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CameraRegistry {
    cameras: BTreeMap<String, String>,
}

impl CameraRegistry {
    #[must_use]
    pub fn new(cameras: BTreeMap<String, String>) -> Self {
        let cameras = cameras
            .into_iter()
            .map(|(name, address)| (name.trim().to_lowercase(), address.trim().to_string()))
            .filter(|(_, address)| !address.is_empty())
            .collect();
        Self { cameras }
    }

    /// Look up a camera by name. Names are case-insensitive; an unknown name
    /// is an error and never falls back to another device.
    pub fn resolve(&self, name: &str) -> Result<Device> {
        let key = name.trim().to_lowercase();
        self.cameras
            .get(&key)
            .map(|address| Device {
                name: key.clone(),
                address: address.clone(),
            })
            .ok_or_else(|| Error::UnknownCamera(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cameras.iter().map(|(n, a)| (n.as_str(), a.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CameraRegistry {
        CameraRegistry::new(
            [
                ("robot".to_string(), "192.168.4.181".to_string()),
                ("Table".to_string(), " 192.168.4.182 ".to_string()),
                ("ceiling".to_string(), String::new()),
            ]
            .into_iter()
            .collect(),
        )
    }

    #[test]
    fn test_resolve_known_camera() {
        let registry = registry();
        let device = registry.resolve("robot").unwrap();
        assert_eq!(device.address, "192.168.4.181");

        let device = registry.resolve("TABLE").unwrap();
        assert_eq!(device.name, "table");
        assert_eq!(device.address, "192.168.4.182");
    }

    #[test]
    fn test_unknown_camera_does_not_fall_back() {
        let registry = registry();
        assert!(matches!(
            registry.resolve("attic"),
            Err(Error::UnknownCamera(name)) if name == "attic"
        ));
        // configured without an address
        assert!(registry.resolve("ceiling").is_err());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("admin", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_snapshot_url() {
        let device = registry().resolve("robot").unwrap();
        assert_eq!(
            device.snapshot_url(None).unwrap().as_str(),
            "http://192.168.4.181/cgi-bin/snapshot.cgi"
        );

        let url = device
            .snapshot_url(Some(&Credentials::new("admin", "p@ss")))
            .unwrap();
        assert_eq!(url.username(), "admin");
        assert_eq!(url.password(), Some("p%40ss"));

        let bad = Device {
            name: "attic".to_string(),
            address: "not a host".to_string(),
        };
        assert!(matches!(bad.snapshot_url(None), Err(Error::Config(_))));
    }
}
