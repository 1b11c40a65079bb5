// Camgate API Library
//
// HTTP routes for PTZ control and media-server proxying

pub mod http;

pub use http::{create_router, AppState};
