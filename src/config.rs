//! Configuration loading and management

use std::path::PathBuf;

use anyhow::{Context, Result};

/// File name of the recording inside the data directory
const DEFAULT_OUTPUT_NAME: &str = "recorded_audio.3gp";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Where every capture session writes; fixed for the process lifetime
    pub output_file: PathBuf,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;

        Ok(Self::resolve(
            &home,
            std::env::var_os("CALLREC_SOCKET").map(PathBuf::from),
            std::env::var_os("CALLREC_OUTPUT_FILE").map(PathBuf::from),
        ))
    }

    /// Build a configuration from a home directory and optional overrides
    pub fn resolve(
        home: &str,
        socket_override: Option<PathBuf>,
        output_override: Option<PathBuf>,
    ) -> Self {
        let data_dir = PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("callrec");

        let socket_path = socket_override.unwrap_or_else(|| data_dir.join("daemon.sock"));
        let output_file = output_override.unwrap_or_else(|| data_dir.join(DEFAULT_OUTPUT_NAME));

        Self {
            socket_path,
            data_dir,
            output_file,
        }
    }

    /// Ensure data and output directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir).context("failed to create data directory")?;

        if let Some(parent) = self.output_file.parent() {
            std::fs::create_dir_all(parent).context("failed to create output directory")?;
        }
        Ok(())
    }
}
