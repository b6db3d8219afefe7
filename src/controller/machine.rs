//! Recording controller state machine
//!
//! Handles transitions between IdleNoSession, AwaitingAuthorization and
//! Recording in response to call-state commands and permission results.
//! All device failures are contained here.

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::authorization::{AuthorizationResult, Authorizer, Capability, RequestToken};
use crate::capture::{CaptureDevice, SessionConfig};
use crate::events::RecorderEvent;

use super::session::CaptureSession;

/// The three states of the controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControllerState {
    /// No session open and no permission request pending
    #[default]
    IdleNoSession,
    /// A permission request is out; nothing is recording
    AwaitingAuthorization,
    /// A capture session is open and recording
    Recording,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::IdleNoSession => write!(f, "IdleNoSession"),
            ControllerState::AwaitingAuthorization => write!(f, "AwaitingAuthorization"),
            ControllerState::Recording => write!(f, "Recording"),
        }
    }
}

/// Commands delivered to the controller, one at a time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// A call became active
    Activate,
    /// The line went idle
    Deactivate,
    /// The permission dialog answered
    AuthorizationResult(AuthorizationResult),
}

/// Owns the capture session and drives it from call-state commands
pub struct RecordingController<D: CaptureDevice, A: Authorizer> {
    device: D,
    authorizer: A,
    session_config: SessionConfig,
    /// The only open session, if any
    session: Option<CaptureSession<D::Handle>>,
    /// Token of the outstanding permission request
    pending: Option<RequestToken>,
    next_token: RequestToken,
    event_tx: broadcast::Sender<RecorderEvent>,
}

impl<D: CaptureDevice, A: Authorizer> RecordingController<D, A> {
    /// Create a controller recording into `session_config.destination`
    pub fn new(
        device: D,
        authorizer: A,
        session_config: SessionConfig,
        event_tx: broadcast::Sender<RecorderEvent>,
    ) -> Self {
        Self {
            device,
            authorizer,
            session_config,
            session: None,
            pending: None,
            next_token: RequestToken::FIRST,
            event_tx,
        }
    }

    /// Get the current state
    pub fn state(&self) -> ControllerState {
        if self.session.is_some() {
            ControllerState::Recording
        } else if self.pending.is_some() {
            ControllerState::AwaitingAuthorization
        } else {
            ControllerState::IdleNoSession
        }
    }

    /// Run the controller, processing commands until the channel closes
    pub async fn run(&mut self, mut command_rx: mpsc::UnboundedReceiver<ControlCommand>) {
        info!("recording controller started in IdleNoSession state");

        while let Some(command) = command_rx.recv().await {
            self.handle(command);
        }

        self.teardown();
        info!("recording controller stopped");
    }

    /// Apply a single command
    pub fn handle(&mut self, command: ControlCommand) {
        let old_state = self.state();

        match command {
            ControlCommand::Activate => self.activate(),
            ControlCommand::Deactivate => self.deactivate(),
            ControlCommand::AuthorizationResult(result) => self.on_authorization_result(result),
        }

        let new_state = self.state();
        if new_state != old_state {
            info!(from = %old_state, to = %new_state, "controller transition");
        }
    }

    /// A call became active: start recording if allowed
    pub fn activate(&mut self) {
        match self.state() {
            ControllerState::Recording => {
                debug!("already recording, ignoring activate");
                return;
            }
            ControllerState::AwaitingAuthorization => {
                debug!("authorization pending, ignoring activate");
                return;
            }
            ControllerState::IdleNoSession => {}
        }

        if self.authorizer.is_granted(Capability::RecordAudio) {
            self.open_session();
        } else {
            self.request_authorization();
        }
    }

    /// The line went idle: finalize whatever is recording
    pub fn deactivate(&mut self) {
        if let Some(token) = self.pending.take() {
            info!(%token, "call ended while awaiting authorization");
            self.emit(RecorderEvent::AuthorizationAbandoned { token });
            return;
        }

        let Some(session) = self.session.take() else {
            debug!("no session open, ignoring deactivate");
            return;
        };

        let session_id = session.id();
        let (duration, stop_error) = session.finish();
        let duration_ms = duration.as_millis() as u64;

        if let Some(e) = stop_error {
            error!(%session_id, error = %e, "stop failed, device released anyway");
            self.emit(RecorderEvent::CaptureFailed {
                reason: e.to_string(),
            });
        }

        info!(%session_id, duration_ms, "[+] Recording stopped.");
        self.emit(RecorderEvent::RecordingStopped {
            session_id,
            duration_ms,
        });
    }

    /// The permission dialog answered a request
    ///
    /// A grant does not start capture for the call in progress; the next
    /// active call records.
    pub fn on_authorization_result(&mut self, result: AuthorizationResult) {
        let token = result.token;
        let granted = result.is_granted(Capability::RecordAudio);

        if self.pending != Some(token) {
            warn!(%token, pending = ?self.pending, granted, "authorization result for stale request");
            if !granted {
                warn!(%token, "[-] Microphone permission denied.");
            }
            return;
        }

        self.pending = None;

        if granted {
            info!(%token, "microphone permission granted");
            self.emit(RecorderEvent::AuthorizationGranted { token });
        } else {
            warn!(%token, "[-] Microphone permission denied.");
            self.emit(RecorderEvent::AuthorizationDenied { token });
        }
    }

    /// Close any open session. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if self.session.is_some() {
            info!("tearing down open capture session");
        }
        self.pending = None;
        self.deactivate();
    }

    fn open_session(&mut self) {
        match CaptureSession::begin(&mut self.device, &self.session_config) {
            Ok(session) => {
                let session_id = session.id();
                let destination = session.config().destination.clone();
                self.session = Some(session);

                info!(%session_id, ?destination, "[+] Recording started...");
                self.emit(RecorderEvent::RecordingStarted {
                    session_id,
                    destination,
                });
            }
            Err(e) => {
                error!(error = %e, "failed to start capture session");
                self.emit(RecorderEvent::CaptureFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    fn request_authorization(&mut self) {
        let token = self.next_token;
        self.next_token = token.next();

        warn!(%token, "[-] Microphone permission denied, requesting authorization");

        match self.authorizer.request(token, Capability::RecordAudio) {
            Ok(()) => {
                self.pending = Some(token);
            }
            Err(e) => {
                error!(%token, error = %e, "failed to request authorization");
            }
        }
    }

    fn emit(&self, event: RecorderEvent) {
        debug!(%event, "emitting recorder event");
        let _ = self.event_tx.send(event);
    }
}

impl<D: CaptureDevice, A: Authorizer> Drop for RecordingController<D, A> {
    fn drop(&mut self) {
        self.teardown();
    }
}
