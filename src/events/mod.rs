//! Events module for recorder transitions
//!
//! Provides structured event types for capture sessions and the
//! authorization round-trip. Broadcast to IPC subscribers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authorization::{Capability, RequestToken};

/// Events emitted by the recording controller during transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecorderEvent {
    /// A capture session was opened and is recording
    RecordingStarted {
        /// Session id for log correlation
        session_id: Uuid,
        /// File the session writes to
        destination: PathBuf,
    },

    /// The capture session was finalized and released
    RecordingStopped {
        /// Session id for log correlation
        session_id: Uuid,
        /// Duration in milliseconds that the session was recording
        duration_ms: u64,
    },

    /// Capture permission is missing; the platform shim should ask the user
    AuthorizationRequested {
        token: RequestToken,
        capability: Capability,
    },

    /// The user granted capture permission
    AuthorizationGranted { token: RequestToken },

    /// The user denied capture permission; the call goes unrecorded
    AuthorizationDenied { token: RequestToken },

    /// The call ended before the permission dialog answered
    AuthorizationAbandoned { token: RequestToken },

    /// The capture device failed to open, prepare, start or stop
    CaptureFailed { reason: String },
}

impl std::fmt::Display for RecorderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecorderEvent::RecordingStarted { session_id, .. } => {
                write!(f, "RECORDING_STARTED ({})", session_id)
            }
            RecorderEvent::RecordingStopped {
                session_id,
                duration_ms,
            } => {
                write!(f, "RECORDING_STOPPED ({}, {}ms)", session_id, duration_ms)
            }
            RecorderEvent::AuthorizationRequested { token, .. } => {
                write!(f, "AUTHORIZATION_REQUESTED (#{})", token)
            }
            RecorderEvent::AuthorizationGranted { token } => {
                write!(f, "AUTHORIZATION_GRANTED (#{})", token)
            }
            RecorderEvent::AuthorizationDenied { token } => {
                write!(f, "AUTHORIZATION_DENIED (#{})", token)
            }
            RecorderEvent::AuthorizationAbandoned { token } => {
                write!(f, "AUTHORIZATION_ABANDONED (#{})", token)
            }
            RecorderEvent::CaptureFailed { reason } => write!(f, "CAPTURE_FAILED: {}", reason),
        }
    }
}
