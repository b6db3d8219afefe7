//! Capture module for the audio-capture device
//!
//! Defines the seam to the device driver and a file-backed device that
//! manages a single AMR container file.

mod amr_file;
mod device;

pub use amr_file::AmrFileDevice;
pub use device::{CaptureDevice, CaptureError, CaptureHandle, SessionConfig};
