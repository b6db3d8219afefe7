//! Recording controller module
//!
//! Provides an explicit state machine with three states:
//! - IdleNoSession: nothing recording, no permission request out
//! - AwaitingAuthorization: permission requested, call unrecorded so far
//! - Recording: exactly one capture session open

mod machine;
mod session;

pub use machine::{ControlCommand, ControllerState, RecordingController};
