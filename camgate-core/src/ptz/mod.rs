//! Pan-tilt-zoom control for the network cameras

pub mod camera;
pub mod command;
pub mod dispatcher;
pub mod transport;

pub use camera::{CameraRegistry, Credentials, Device, DEFAULT_CAMERA};
pub use command::{CommandVerb, DeviceCommand, MotionCode, PtzAction};
pub use dispatcher::{CameraCheck, DispatchOutcome, PtzDispatcher, StepReply, MIN_SNAPSHOT_BYTES};
pub use transport::{
    CommandReply, CommandTransport, Delivery, ExecTransport, HttpTransport, SnapshotReply,
};
