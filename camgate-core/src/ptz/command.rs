//! Logical PTZ actions and the device command vocabulary

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use super::camera::{Credentials, Device};
use crate::error::{Error, Result};

/// Valid directional/zoom speed range
pub const SPEED_RANGE: std::ops::RangeInclusive<u32> = 1..=8;

/// Valid preset index range
pub const PRESET_RANGE: std::ops::RangeInclusive<u32> = 1..=255;

/// Action names accepted from clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PtzAction {
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
    ZoomIn,
    ZoomOut,
    Stop,
    GotoPreset,
}

impl PtzAction {
    pub const ALL: [Self; 12] = [
        Self::Up,
        Self::Down,
        Self::Left,
        Self::Right,
        Self::UpLeft,
        Self::UpRight,
        Self::DownLeft,
        Self::DownRight,
        Self::ZoomIn,
        Self::ZoomOut,
        Self::Stop,
        Self::GotoPreset,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
            Self::UpLeft => "up-left",
            Self::UpRight => "up-right",
            Self::DownLeft => "down-left",
            Self::DownRight => "down-right",
            Self::ZoomIn => "zoom-in",
            Self::ZoomOut => "zoom-out",
            Self::Stop => "stop",
            Self::GotoPreset => "goto-preset",
        }
    }

    /// Device primitive for this action. `Stop` has none: it is sent as a
    /// batch of zero-speed directional commands.
    #[must_use]
    pub const fn motion_code(self) -> Option<MotionCode> {
        match self {
            Self::Up => Some(MotionCode::Up),
            Self::Down => Some(MotionCode::Down),
            Self::Left => Some(MotionCode::Left),
            Self::Right => Some(MotionCode::Right),
            Self::UpLeft => Some(MotionCode::LeftUp),
            Self::UpRight => Some(MotionCode::RightUp),
            Self::DownLeft => Some(MotionCode::LeftDown),
            Self::DownRight => Some(MotionCode::RightDown),
            Self::ZoomIn => Some(MotionCode::ZoomTele),
            Self::ZoomOut => Some(MotionCode::ZoomWide),
            Self::GotoPreset => Some(MotionCode::GotoPreset),
            Self::Stop => None,
        }
    }

    /// Map a raw device motion code back to the action that produces it.
    /// Only continuous-motion codes are accepted.
    pub fn from_device_code(code: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .filter(|a| !matches!(a, Self::Stop | Self::GotoPreset))
            .find(|a| a.motion_code().is_some_and(|c| c.as_str() == code))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown PTZ code: {code}")))
    }
}

impl fmt::Display for PtzAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PtzAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == needle)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown action: {s}")))
    }
}

/// Primitive motion codes understood by the camera's `ptz.cgi`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MotionCode {
    Up,
    Down,
    Left,
    Right,
    LeftUp,
    RightUp,
    LeftDown,
    RightDown,
    ZoomTele,
    ZoomWide,
    GotoPreset,
}

impl MotionCode {
    /// Directions halted, in order, by the compound stop.
    pub const STOP_SEQUENCE: [Self; 4] = [Self::Up, Self::Down, Self::Left, Self::Right];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "Up",
            Self::Down => "Down",
            Self::Left => "Left",
            Self::Right => "Right",
            Self::LeftUp => "LeftUp",
            Self::RightUp => "RightUp",
            Self::LeftDown => "LeftDown",
            Self::RightDown => "RightDown",
            Self::ZoomTele => "ZoomTele",
            Self::ZoomWide => "ZoomWide",
            Self::GotoPreset => "GotoPreset",
        }
    }
}

impl fmt::Display for MotionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `action=` parameter of the device command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandVerb {
    Start,
    Stop,
}

impl CommandVerb {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

/// One primitive command addressed to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCommand {
    pub verb: CommandVerb,
    pub channel: u32,
    pub code: MotionCode,
    /// Speed for motion commands, preset index for `GotoPreset`, 0 for halts
    pub arg: u32,
}

impl DeviceCommand {
    #[must_use]
    pub const fn start(channel: u32, code: MotionCode, arg: u32) -> Self {
        Self {
            verb: CommandVerb::Start,
            channel,
            code,
            arg,
        }
    }

    /// Zero-speed halt of one direction
    #[must_use]
    pub const fn halt(channel: u32, code: MotionCode) -> Self {
        Self {
            verb: CommandVerb::Stop,
            channel,
            code,
            arg: 0,
        }
    }

    /// Build the `ptz.cgi` URL for this command. When `credentials` is given
    /// they are embedded in the URL authority.
    pub fn url(&self, device: &Device, credentials: Option<&Credentials>) -> Result<Url> {
        let mut url = device.cgi_url("ptz.cgi", credentials)?;
        url.query_pairs_mut()
            .append_pair("action", self.verb.as_str())
            .append_pair("channel", &self.channel.to_string())
            .append_pair("code", self.code.as_str())
            .append_pair("arg1", "0")
            .append_pair("arg2", &self.arg.to_string())
            .append_pair("arg3", "0");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Device {
        Device {
            name: "robot".to_string(),
            address: "192.168.4.181".to_string(),
        }
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("up".parse::<PtzAction>().unwrap(), PtzAction::Up);
        assert_eq!("down-left".parse::<PtzAction>().unwrap(), PtzAction::DownLeft);
        assert_eq!("zoom-in".parse::<PtzAction>().unwrap(), PtzAction::ZoomIn);
        assert_eq!("goto-preset".parse::<PtzAction>().unwrap(), PtzAction::GotoPreset);
        assert!(matches!("spin".parse::<PtzAction>(), Err(Error::InvalidInput(_))));
        assert!("Up".parse::<PtzAction>().is_err());
    }

    #[test]
    fn test_action_to_device_code() {
        assert_eq!(PtzAction::UpLeft.motion_code(), Some(MotionCode::LeftUp));
        assert_eq!(PtzAction::DownRight.motion_code(), Some(MotionCode::RightDown));
        assert_eq!(PtzAction::ZoomOut.motion_code(), Some(MotionCode::ZoomWide));
        assert_eq!(PtzAction::Stop.motion_code(), None);
    }

    #[test]
    fn test_from_device_code() {
        assert_eq!(PtzAction::from_device_code("Up").unwrap(), PtzAction::Up);
        assert_eq!(PtzAction::from_device_code("RightUp").unwrap(), PtzAction::UpRight);
        assert_eq!(PtzAction::from_device_code("ZoomTele").unwrap(), PtzAction::ZoomIn);
        assert!(PtzAction::from_device_code("GotoPreset").is_err());
        assert!(PtzAction::from_device_code("Stop").is_err());
        assert!(PtzAction::from_device_code("up").is_err());
    }

    #[test]
    fn test_command_url_with_credentials() {
        let cmd = DeviceCommand::start(1, MotionCode::Up, 4);
        let creds = Credentials::new("admin", "p@ss word");
        let url = cmd.url(&device(), Some(&creds)).unwrap();

        assert_eq!(url.host_str(), Some("192.168.4.181"));
        assert_eq!(url.path(), "/cgi-bin/ptz.cgi");
        assert_eq!(url.username(), "admin");
        assert_eq!(url.password(), Some("p%40ss%20word"));
        assert_eq!(
            url.query(),
            Some("action=start&channel=1&code=Up&arg1=0&arg2=4&arg3=0")
        );
    }

    #[test]
    fn test_halt_url_without_credentials() {
        let cmd = DeviceCommand::halt(1, MotionCode::Left);
        let url = cmd.url(&device(), None).unwrap();
        assert_eq!(url.username(), "");
        assert_eq!(
            url.as_str(),
            "http://192.168.4.181/cgi-bin/ptz.cgi?action=stop&channel=1&code=Left&arg1=0&arg2=0&arg3=0"
        );
    }

    #[test]
    fn test_invalid_address() {
        let bad = Device {
            name: "robot".to_string(),
            address: "bad host/".to_string(),
        };
        let cmd = DeviceCommand::halt(1, MotionCode::Up);
        assert!(matches!(cmd.url(&bad, None), Err(Error::Config(_))));
    }
}
