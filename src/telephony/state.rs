//! Call state classification
//!
//! Maps raw platform call-state codes onto the three classes the
//! recorder cares about.

/// Raw call-state codes delivered by the telephony subsystem
pub mod codes {
    /// No call on the line
    pub const IDLE: i32 = 0;
    /// Incoming call ringing, not yet answered
    pub const RINGING: i32 = 1;
    /// At least one call is dialing, active or on hold
    pub const OFFHOOK: i32 = 2;
}

/// Classified line activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Line went idle: the call ended
    Idle,
    /// Line is off-hook: a call is in progress
    Active,
    /// Anything else (ringing, unknown codes)
    Other,
}

impl CallState {
    /// Classify a raw platform code
    pub fn from_raw(raw_state: i32) -> Self {
        match raw_state {
            codes::IDLE => CallState::Idle,
            codes::OFFHOOK => CallState::Active,
            _ => CallState::Other,
        }
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallState::Idle => write!(f, "Idle"),
            CallState::Active => write!(f, "Active"),
            CallState::Other => write!(f, "Other"),
        }
    }
}
