//! Call-state monitor
//!
//! Classifies call-state events and forwards the actionable ones to the
//! recording controller. Never touches the device or permission state.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::controller::ControlCommand;

use super::source::CallStateSource;
use super::state::CallState;

/// Routes Active and Idle transitions to the recording controller
#[derive(Debug, Clone)]
pub struct CallStateMonitor {
    command_tx: mpsc::UnboundedSender<ControlCommand>,
}

impl CallStateMonitor {
    /// Create a monitor that forwards into `command_tx`
    pub fn new(command_tx: mpsc::UnboundedSender<ControlCommand>) -> Self {
        Self { command_tx }
    }

    /// Subscribe this monitor to a call-state source
    pub fn register<S: CallStateSource + ?Sized>(&self, source: &S) {
        let monitor = self.clone();
        source.subscribe(Box::new(move |event| {
            monitor.on_state_event(event.raw_state, event.counterparty.as_deref());
        }));
    }

    /// Handle one raw call-state change
    ///
    /// Duplicates are forwarded as-is; the controller ignores repeats.
    pub fn on_state_event(&self, raw_state: i32, counterparty: Option<&str>) {
        let call_state = CallState::from_raw(raw_state);
        debug!(raw_state, %call_state, ?counterparty, "call state changed");

        let command = match call_state {
            CallState::Active => ControlCommand::Activate,
            CallState::Idle => ControlCommand::Deactivate,
            CallState::Other => return,
        };

        if self.command_tx.send(command).is_err() {
            warn!(%call_state, "recording controller gone, dropping call state");
        }
    }
}
