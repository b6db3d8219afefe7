//! Capture device traits and session configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Audio channel a session records from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioSource {
    /// Uplink and downlink audio of the active voice call
    VoiceCall,
}

/// Container the session writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    ThreeGpp,
}

/// Codec used for the recorded audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEncoder {
    /// Adaptive multi-rate narrowband speech codec
    AmrNb,
}

/// Everything a device needs to configure one capture session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// File the session writes to; truncated on every new session
    pub destination: PathBuf,
    pub source: AudioSource,
    pub format: OutputFormat,
    pub encoder: AudioEncoder,
}

impl SessionConfig {
    /// Voice-call recording into a 3GPP/AMR-NB file at `destination`
    pub fn voice_call(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            source: AudioSource::VoiceCall,
            format: OutputFormat::ThreeGpp,
            encoder: AudioEncoder::AmrNb,
        }
    }
}

/// The audio-capture device driver
pub trait CaptureDevice: Send {
    type Handle: CaptureHandle;

    /// Claim the device and configure a session. The returned handle is
    /// configured but neither prepared nor started.
    fn open(&mut self, config: &SessionConfig) -> Result<Self::Handle, CaptureError>;
}

/// One claimed device session
pub trait CaptureHandle: Send {
    /// Allocate the destination and driver buffers
    fn prepare(&mut self) -> Result<(), CaptureError>;

    /// Begin recording
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Stop recording and finalize the destination file
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Give the device back. Always succeeds.
    fn release(self);
}

/// Errors reported by a capture device
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("failed to prepare capture into {path:?}")]
    PrepareFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start capture: {0}")]
    StartFailed(String),

    #[error("failed to stop capture: {0}")]
    StopFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_call_config() {
        let config = SessionConfig::voice_call("/tmp/call.3gp");
        assert_eq!(config.destination, PathBuf::from("/tmp/call.3gp"));
        assert_eq!(config.source, AudioSource::VoiceCall);
        assert_eq!(config.format, OutputFormat::ThreeGpp);
        assert_eq!(config.encoder, AudioEncoder::AmrNb);
    }
}
