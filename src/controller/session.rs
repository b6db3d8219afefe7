//! Capture session owned by the recording controller
//!
//! Wraps a device handle and walks it through configured → prepared →
//! recording. Every exit path releases the handle exactly once.

use std::time::{Duration, Instant};

use tracing::debug;
use uuid::Uuid;

use crate::capture::{CaptureDevice, CaptureError, CaptureHandle, SessionConfig};

/// Progress of a session through its setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionPhase {
    Configured,
    Prepared,
    Recording,
}

/// One open recording
#[derive(Debug)]
pub struct CaptureSession<H: CaptureHandle> {
    id: Uuid,
    config: SessionConfig,
    phase: SessionPhase,
    started_at: Instant,
    handle: H,
}

impl<H: CaptureHandle> CaptureSession<H> {
    /// Open, prepare and start a session on `device`
    ///
    /// On failure the handle (if one was opened) has already been released.
    pub fn begin<D>(device: &mut D, config: &SessionConfig) -> Result<Self, CaptureError>
    where
        D: CaptureDevice<Handle = H>,
    {
        let handle = device.open(config)?;
        let mut session = Self {
            id: Uuid::new_v4(),
            config: config.clone(),
            phase: SessionPhase::Configured,
            started_at: Instant::now(),
            handle,
        };

        match session.advance() {
            Ok(()) => Ok(session),
            Err(e) => {
                debug!(session_id = %session.id, phase = ?session.phase, "discarding failed session");
                session.handle.release();
                Err(e)
            }
        }
    }

    fn advance(&mut self) -> Result<(), CaptureError> {
        self.handle.prepare()?;
        self.phase = SessionPhase::Prepared;

        self.handle.start()?;
        self.phase = SessionPhase::Recording;
        self.started_at = Instant::now();
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Stop and release the session
    ///
    /// Returns how long it recorded, plus the stop error if the device
    /// rejected the stop. The handle is released either way.
    pub fn finish(mut self) -> (Duration, Option<CaptureError>) {
        let stop_result = self.handle.stop();
        let duration = self.started_at.elapsed();
        self.handle.release();

        (duration, stop_result.err())
    }
}
