//! File-backed capture device
//!
//! Claims a single device slot and lays down an AMR-NB storage file
//! (RFC 4867 section 5). Only the container is written: the file is
//! truncated on prepare, gets the magic header on start and is synced on
//! stop. Encoding speech frames is not done here.

use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::device::{AudioEncoder, CaptureDevice, CaptureError, CaptureHandle, SessionConfig};

/// Magic header of a single-channel AMR-NB file
pub const AMR_NB_MAGIC: &[u8] = b"#!AMR\n";

/// Device that records into the session's destination file
#[derive(Debug, Clone, Default)]
pub struct AmrFileDevice {
    in_use: Arc<AtomicBool>,
}

impl AmrFileDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a handle currently holds the device
    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::SeqCst)
    }
}

impl CaptureDevice for AmrFileDevice {
    type Handle = AmrFileHandle;

    fn open(&mut self, config: &SessionConfig) -> Result<AmrFileHandle, CaptureError> {
        if config.encoder != AudioEncoder::AmrNb {
            return Err(CaptureError::DeviceUnavailable(format!(
                "unsupported encoder {:?}",
                config.encoder
            )));
        }

        if self.in_use.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::DeviceUnavailable(
                "capture device already in use".to_string(),
            ));
        }

        debug!(destination = ?config.destination, "capture device claimed");

        Ok(AmrFileHandle {
            config: config.clone(),
            phase: Phase::Configured,
            file: None,
            in_use: Arc::clone(&self.in_use),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Configured,
    Prepared,
    Recording,
    Stopped,
}

/// A claimed session on an [`AmrFileDevice`]
#[derive(Debug)]
pub struct AmrFileHandle {
    config: SessionConfig,
    phase: Phase,
    file: Option<File>,
    in_use: Arc<AtomicBool>,
}

impl CaptureHandle for AmrFileHandle {
    fn prepare(&mut self) -> Result<(), CaptureError> {
        let path = &self.config.destination;

        // Truncates any previous recording
        let file = File::create(path).map_err(|source| CaptureError::PrepareFailed {
            path: path.clone(),
            source,
        })?;

        self.file = Some(file);
        self.phase = Phase::Prepared;
        Ok(())
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        let file = match (self.phase, self.file.as_mut()) {
            (Phase::Prepared, Some(file)) => file,
            (phase, _) => {
                return Err(CaptureError::StartFailed(format!(
                    "start called while {:?}",
                    phase
                )))
            }
        };

        file.write_all(AMR_NB_MAGIC)
            .map_err(|e| CaptureError::StartFailed(e.to_string()))?;

        self.phase = Phase::Recording;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        let file = match (self.phase, self.file.as_mut()) {
            (Phase::Recording, Some(file)) => file,
            (phase, _) => {
                return Err(CaptureError::StopFailed(format!(
                    "stop called while {:?}",
                    phase
                )))
            }
        };

        self.phase = Phase::Stopped;
        file.flush()
            .and_then(|()| file.sync_all())
            .map_err(|e| CaptureError::StopFailed(e.to_string()))
    }

    fn release(self) {
        // Drop closes the file and frees the slot
    }
}

impl Drop for AmrFileHandle {
    fn drop(&mut self) {
        self.file = None;
        self.in_use.store(false, Ordering::SeqCst);
        debug!(destination = ?self.config.destination, "capture device released");
    }
}
