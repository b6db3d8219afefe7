//! Authorization module for capture permission
//!
//! Models the platform permission dialog as an explicit request/result
//! pair correlated by a [`RequestToken`].

mod broker;

use serde::{Deserialize, Serialize};

pub use broker::{DialogAttachment, PermissionBroker};

/// Capabilities the daemon may ask the platform for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Access to the audio-capture device
    RecordAudio,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::RecordAudio => write!(f, "record_audio"),
        }
    }
}

/// Correlates an authorization request with its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestToken(u32);

impl RequestToken {
    /// First token handed out by a fresh controller
    pub const FIRST: RequestToken = RequestToken(100);

    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Token following this one
    pub fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for RequestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome for one requested capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityGrant {
    pub capability: Capability,
    pub granted: bool,
}

/// Result delivered by the permission dialog for a prior request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResult {
    pub token: RequestToken,
    pub grants: Vec<CapabilityGrant>,
}

impl AuthorizationResult {
    /// Build a result carrying a single outcome
    pub fn single(token: RequestToken, capability: Capability, granted: bool) -> Self {
        Self {
            token,
            grants: vec![CapabilityGrant {
                capability,
                granted,
            }],
        }
    }

    /// Whether `capability` was granted. A result without an entry for
    /// the capability (e.g. a dismissed dialog) counts as denied.
    pub fn is_granted(&self, capability: Capability) -> bool {
        self.grants
            .iter()
            .any(|grant| grant.capability == capability && grant.granted)
    }
}

/// Read access to the grant state plus the ability to ask for it
pub trait Authorizer: Send {
    /// Whether `capability` is currently granted
    fn is_granted(&self, capability: Capability) -> bool;

    /// Ask the platform to show its permission dialog. The answer arrives
    /// later as an [`AuthorizationResult`] carrying the same token.
    fn request(
        &mut self,
        token: RequestToken,
        capability: Capability,
    ) -> Result<(), AuthorizationError>;
}

/// Errors that can occur while requesting authorization
#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    #[error("no permission dialog is reachable to handle request #{0}")]
    Unavailable(RequestToken),
}
