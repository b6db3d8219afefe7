//! Daemon-side authorizer
//!
//! Publishes permission requests to IPC subscribers (the platform shim
//! shows the dialog) and records the grant it reports back. A request is
//! only issued while at least one subscribed client holds a
//! [`DialogAttachment`]; internal event listeners do not count.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::events::RecorderEvent;

use super::{AuthorizationError, AuthorizationResult, Authorizer, Capability, RequestToken};

/// Tracks the record-audio grant and forwards requests to the platform
#[derive(Clone)]
pub struct PermissionBroker {
    granted: Arc<AtomicBool>,
    dialogs: Arc<AtomicUsize>,
    event_tx: broadcast::Sender<RecorderEvent>,
}

/// Marks one subscribed client able to show the permission dialog.
/// Detaches when dropped.
#[derive(Debug)]
pub struct DialogAttachment {
    dialogs: Arc<AtomicUsize>,
}

impl Drop for DialogAttachment {
    fn drop(&mut self) {
        let remaining = self.dialogs.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!(remaining, "permission dialog host detached");
    }
}

impl PermissionBroker {
    /// Create a broker with the grant initially absent
    pub fn new(event_tx: broadcast::Sender<RecorderEvent>) -> Self {
        Self {
            granted: Arc::new(AtomicBool::new(false)),
            dialogs: Arc::new(AtomicUsize::new(0)),
            event_tx,
        }
    }

    /// Store the grant carried by a permission result
    pub fn record(&self, result: &AuthorizationResult) {
        let granted = result.is_granted(Capability::RecordAudio);
        let previous = self.granted.swap(granted, Ordering::SeqCst);

        if previous != granted {
            info!(token = %result.token, granted, "capture permission changed");
        }
    }

    /// Current grant, for status reporting
    pub fn granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    /// Register a client that will answer permission requests
    pub fn attach_dialog(&self) -> DialogAttachment {
        let attached = self.dialogs.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(attached, "permission dialog host attached");
        DialogAttachment {
            dialogs: Arc::clone(&self.dialogs),
        }
    }

    /// Number of clients currently able to show the dialog
    pub fn dialogs_attached(&self) -> usize {
        self.dialogs.load(Ordering::SeqCst)
    }
}

impl Authorizer for PermissionBroker {
    fn is_granted(&self, capability: Capability) -> bool {
        match capability {
            Capability::RecordAudio => self.granted(),
        }
    }

    fn request(
        &mut self,
        token: RequestToken,
        capability: Capability,
    ) -> Result<(), AuthorizationError> {
        if self.dialogs_attached() == 0 {
            warn!(%token, "no subscribed client can show the permission dialog");
            return Err(AuthorizationError::Unavailable(token));
        }

        let event = RecorderEvent::AuthorizationRequested { token, capability };
        let delivered = self
            .event_tx
            .send(event)
            .map_err(|_| AuthorizationError::Unavailable(token))?;

        debug!(%token, %capability, receivers = delivered, "authorization request published");
        Ok(())
    }
}
