//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authorization::{CapabilityGrant, RequestToken};
use crate::controller::ControllerState;
use crate::events::RecorderEvent;

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Recorder state as reported to clients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderMode {
    /// Nothing recording
    #[default]
    Idle,
    /// Waiting for the user to answer the permission dialog
    AwaitingAuthorization,
    /// A call is being recorded
    Recording,
}

/// Requests from the platform shim or UI shell to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Telephony reported a call-state change
    CallState {
        raw_state: i32,
        #[serde(default)]
        counterparty: Option<String>,
    },

    /// The permission dialog answered a request
    AuthorizationResult {
        token: RequestToken,
        grants: Vec<CapabilityGrant>,
    },

    /// Ping to check connectivity
    Ping,

    /// Subscribe to recorder event notifications
    Subscribe,
}

/// Responses from daemon to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Event handed to the recorder
    Accepted,

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Push notification from daemon to subscribed clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Recorder event occurred
    RecorderEvent { event: RecorderEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Current recorder state
    pub state: RecorderMode,

    /// Id of the open session, while recording
    pub session_id: Option<Uuid>,

    /// Destination of every recording
    pub output_file: PathBuf,

    /// Whether capture permission is currently granted
    pub permission_granted: bool,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl DaemonStatus {
    pub fn new(output_file: PathBuf, state: RecorderMode) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state,
            session_id: None,
            output_file,
            permission_granted: false,
            uptime_secs: 0,
        }
    }

    /// Fold a recorder event into the snapshot
    pub fn apply(&mut self, event: &RecorderEvent) {
        match event {
            RecorderEvent::RecordingStarted { session_id, .. } => {
                self.state = RecorderMode::Recording;
                self.session_id = Some(*session_id);
            }
            RecorderEvent::RecordingStopped { .. } => {
                self.state = RecorderMode::Idle;
                self.session_id = None;
            }
            RecorderEvent::AuthorizationRequested { .. } => {
                self.state = RecorderMode::AwaitingAuthorization;
            }
            RecorderEvent::AuthorizationGranted { .. }
            | RecorderEvent::AuthorizationDenied { .. }
            | RecorderEvent::AuthorizationAbandoned { .. } => {
                self.state = RecorderMode::Idle;
            }
            // Failures never change state on their own
            RecorderEvent::CaptureFailed { .. } => {}
        }
    }
}

/// Convert internal controller state to the IPC mode
impl From<ControllerState> for RecorderMode {
    fn from(state: ControllerState) -> Self {
        match state {
            ControllerState::IdleNoSession => RecorderMode::Idle,
            ControllerState::AwaitingAuthorization => RecorderMode::AwaitingAuthorization,
            ControllerState::Recording => RecorderMode::Recording,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::Capability;

    #[test]
    fn test_call_state_request_parsing() {
        let json = r#"{"type":"call_state","raw_state":2,"counterparty":"+15551234567"}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert_eq!(
            req,
            Request::CallState {
                raw_state: 2,
                counterparty: Some("+15551234567".to_string()),
            }
        );
    }

    #[test]
    fn test_counterparty_is_optional() {
        let json = r#"{"type":"call_state","raw_state":0}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert_eq!(
            req,
            Request::CallState {
                raw_state: 0,
                counterparty: None,
            }
        );
    }

    #[test]
    fn test_authorization_result_parsing() {
        let json = r#"{"type":"authorization_result","token":100,
            "grants":[{"capability":"record_audio","granted":true}]}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert_eq!(
            req,
            Request::AuthorizationResult {
                token: RequestToken::new(100),
                grants: vec![CapabilityGrant {
                    capability: Capability::RecordAudio,
                    granted: true,
                }],
            }
        );
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::new(PathBuf::from("/tmp/a.3gp"), RecorderMode::Idle));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""state":"idle""#));
    }

    #[test]
    fn test_notification_nests_event() {
        let note = Notification::RecorderEvent {
            event: RecorderEvent::AuthorizationRequested {
                token: RequestToken::FIRST,
                capability: Capability::RecordAudio,
            },
        };
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["type"], "recorder_event");
        assert_eq!(value["event"]["type"], "authorization_requested");
        assert_eq!(value["event"]["token"], 100);
    }

    #[test]
    fn test_status_follows_events() {
        let mut status = DaemonStatus::new(PathBuf::from("/tmp/a.3gp"), RecorderMode::Idle);
        let session_id = Uuid::new_v4();

        status.apply(&RecorderEvent::RecordingStarted {
            session_id,
            destination: PathBuf::from("/tmp/a.3gp"),
        });
        assert_eq!(status.state, RecorderMode::Recording);
        assert_eq!(status.session_id, Some(session_id));

        status.apply(&RecorderEvent::CaptureFailed {
            reason: "stop failed".to_string(),
        });
        assert_eq!(status.state, RecorderMode::Recording);

        status.apply(&RecorderEvent::RecordingStopped {
            session_id,
            duration_ms: 10,
        });
        assert_eq!(status.state, RecorderMode::Idle);
        assert_eq!(status.session_id, None);
    }

    #[test]
    fn test_mode_from_controller_state() {
        assert_eq!(
            RecorderMode::from(ControllerState::AwaitingAuthorization),
            RecorderMode::AwaitingAuthorization
        );
        assert_eq!(
            RecorderMode::from(ControllerState::Recording),
            RecorderMode::Recording
        );
    }
}
