//! Call-state subscription interface and the IPC-fed event source

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One call-state change as delivered by the telephony subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStateEvent {
    /// Platform call-state code, see [`super::codes`]
    pub raw_state: i32,
    /// Number or identifier of the other party, when the platform exposes it
    pub counterparty: Option<String>,
}

/// Callback invoked for every call-state change
pub type CallStateHandler = Box<dyn Fn(&CallStateEvent) + Send + Sync>;

/// Anything that can deliver call-state changes to a subscriber
pub trait CallStateSource {
    fn subscribe(&self, handler: CallStateHandler);
}

/// Call-state source fed by the platform shim over IPC
#[derive(Clone, Default)]
pub struct TelephonyBridge {
    handlers: Arc<RwLock<Vec<CallStateHandler>>>,
}

impl TelephonyBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every subscriber, returning how many saw it
    pub fn publish(&self, event: &CallStateEvent) -> usize {
        let handlers = self.handlers.read();
        for handler in handlers.iter() {
            handler(event);
        }

        debug!(
            raw_state = event.raw_state,
            subscribers = handlers.len(),
            "call state published"
        );
        handlers.len()
    }
}

impl CallStateSource for TelephonyBridge {
    fn subscribe(&self, handler: CallStateHandler) {
        self.handlers.write().push(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn test_publish_reaches_subscribers() {
        let bridge = TelephonyBridge::new();
        let seen = Arc::new(AtomicI32::new(-1));

        let seen_by_handler = Arc::clone(&seen);
        bridge.subscribe(Box::new(move |event| {
            seen_by_handler.store(event.raw_state, Ordering::SeqCst);
        }));

        let delivered = bridge.publish(&CallStateEvent {
            raw_state: 2,
            counterparty: Some("+15551234567".to_string()),
        });

        assert_eq!(delivered, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bridge = TelephonyBridge::new();
        let delivered = bridge.publish(&CallStateEvent {
            raw_state: 0,
            counterparty: None,
        });
        assert_eq!(delivered, 0);
    }
}
