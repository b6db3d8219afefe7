//! Telephony module for call-state monitoring
//!
//! The platform shim reports call-state changes over IPC; the monitor
//! turns them into start/stop commands for the recording controller.

mod monitor;
mod source;
mod state;

pub use monitor::CallStateMonitor;
pub use source::{CallStateEvent, TelephonyBridge};
pub use state::codes;
