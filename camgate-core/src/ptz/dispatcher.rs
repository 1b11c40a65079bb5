//! PTZ command dispatch
//!
//! Each request runs resolve device → build command(s) → send → interpret.
//! No state is kept between requests.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::camera::{CameraRegistry, Device};
use super::command::{DeviceCommand, MotionCode, PtzAction, PRESET_RANGE, SPEED_RANGE};
use super::transport::{
    transport_from_config, CommandReply, CommandTransport, Delivery, SnapshotReply,
};
use crate::config::PtzConfig;
use crate::error::{Error, Result};

/// Result of one primitive command within a dispatch
#[derive(Debug, Clone, Serialize)]
pub struct StepReply {
    pub code: MotionCode,
    #[serde(flatten)]
    pub reply: CommandReply,
}

/// Result of a dispatched action
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub camera: String,
    pub action: PtzAction,
    pub steps: Vec<StepReply>,
}

impl DispatchOutcome {
    /// True only when every primitive command was accepted.
    #[must_use]
    pub fn ok(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.reply.ok())
    }

    /// First primitive command that was not accepted
    #[must_use]
    pub fn first_failure(&self) -> Option<&StepReply> {
        self.steps.iter().find(|s| !s.reply.ok())
    }

    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.first_failure().map_or(200, |s| s.reply.http_status())
    }
}

/// Snapshots at or below this size are error pages, not images.
pub const MIN_SNAPSHOT_BYTES: usize = 1000;

/// Result of a camera connectivity check
#[derive(Debug, Clone, Serialize)]
pub struct CameraCheck {
    pub camera: String,
    pub address: String,
    pub snapshot: SnapshotReply,
}

impl CameraCheck {
    #[must_use]
    pub fn ok(&self) -> bool {
        self.snapshot.delivery == Delivery::Accepted && self.snapshot.size > MIN_SNAPSHOT_BYTES
    }

    /// Why the check failed, if it did
    #[must_use]
    pub fn failure(&self) -> Option<String> {
        if self.ok() {
            return None;
        }
        Some(match &self.snapshot.error {
            Some(error) => error.clone(),
            None => format!("snapshot too small ({} bytes)", self.snapshot.size),
        })
    }
}

pub struct PtzDispatcher {
    cameras: CameraRegistry,
    transport: Arc<dyn CommandTransport>,
    channel: u32,
    default_speed: u8,
}

impl PtzDispatcher {
    pub fn new(
        cameras: CameraRegistry,
        transport: Arc<dyn CommandTransport>,
        channel: u32,
        default_speed: u8,
    ) -> Self {
        Self {
            cameras,
            transport,
            channel,
            default_speed,
        }
    }

    pub fn from_config(config: &PtzConfig) -> Result<Self> {
        Ok(Self::new(
            CameraRegistry::new(config.cameras.clone()),
            transport_from_config(config)?,
            config.channel,
            config.default_speed,
        ))
    }

    #[must_use]
    pub const fn cameras(&self) -> &CameraRegistry {
        &self.cameras
    }

    #[must_use]
    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Dispatch an action. `arg` is the speed for motion actions, the preset
    /// index for `goto-preset`, and ignored for `stop`.
    ///
    /// Unknown cameras and invalid arguments fail before anything is sent.
    pub async fn dispatch(
        &self,
        camera: &str,
        action: PtzAction,
        arg: Option<u32>,
    ) -> Result<DispatchOutcome> {
        let device = self.cameras.resolve(camera)?;
        let commands = self.build_commands(action, arg)?;

        info!(camera = %device.name, %action, commands = commands.len(), "Dispatching PTZ action");

        let steps = self.send_all(&device, &commands).await;
        let outcome = DispatchOutcome {
            camera: device.name,
            action,
            steps,
        };

        if let Some(failed) = outcome.first_failure() {
            warn!(
                camera = %outcome.camera,
                %action,
                code = %failed.code,
                delivery = ?failed.reply.delivery,
                "PTZ action failed"
            );
        }

        Ok(outcome)
    }

    /// Halt all motion.
    pub async fn stop(&self, camera: &str) -> Result<DispatchOutcome> {
        self.dispatch(camera, PtzAction::Stop, None).await
    }

    /// Move to a stored preset.
    pub async fn goto_preset(&self, camera: &str, preset: u32) -> Result<DispatchOutcome> {
        self.dispatch(camera, PtzAction::GotoPreset, Some(preset)).await
    }

    /// Fetch a snapshot to see whether the camera answers with credentials.
    pub async fn check(&self, camera: &str) -> Result<CameraCheck> {
        let device = self.cameras.resolve(camera)?;
        let snapshot = self.transport.snapshot(&device).await;
        let check = CameraCheck {
            camera: device.name,
            address: device.address,
            snapshot,
        };

        if check.ok() {
            info!(camera = %check.camera, size = check.snapshot.size, "Camera check passed");
        } else {
            warn!(
                camera = %check.camera,
                delivery = ?check.snapshot.delivery,
                size = check.snapshot.size,
                "Camera check failed"
            );
        }

        Ok(check)
    }

    fn build_commands(&self, action: PtzAction, arg: Option<u32>) -> Result<Vec<DeviceCommand>> {
        match action {
            // The device has no reliable halt primitive, so each axis is
            // stopped with its own zero-speed command.
            PtzAction::Stop => Ok(MotionCode::STOP_SEQUENCE
                .into_iter()
                .map(|code| DeviceCommand::halt(self.channel, code))
                .collect()),
            PtzAction::GotoPreset => {
                let preset =
                    arg.ok_or_else(|| Error::InvalidInput("preset is required".to_string()))?;
                if !PRESET_RANGE.contains(&preset) {
                    return Err(Error::InvalidInput(format!(
                        "preset must be between {} and {}, got {preset}",
                        PRESET_RANGE.start(),
                        PRESET_RANGE.end()
                    )));
                }
                Ok(vec![DeviceCommand::start(self.channel, MotionCode::GotoPreset, preset)])
            }
            motion => {
                let code = motion
                    .motion_code()
                    .ok_or_else(|| Error::InvalidInput(format!("Unsupported action: {motion}")))?;
                let speed = arg.unwrap_or_else(|| u32::from(self.default_speed));
                if !SPEED_RANGE.contains(&speed) {
                    return Err(Error::InvalidInput(format!(
                        "speed must be between {} and {}, got {speed}",
                        SPEED_RANGE.start(),
                        SPEED_RANGE.end()
                    )));
                }
                Ok(vec![DeviceCommand::start(self.channel, code, speed)])
            }
        }
    }

    /// Send every command in order. Failures do not short-circuit: each
    /// direction may drive a different motor.
    async fn send_all(&self, device: &Device, commands: &[DeviceCommand]) -> Vec<StepReply> {
        let mut steps = Vec::with_capacity(commands.len());
        for command in commands {
            let reply = self.transport.send(device, command).await;
            steps.push(StepReply {
                code: command.code,
                reply,
            });
        }
        steps
    }
}
