//! callrec-daemon: Background daemon that records voice calls
//!
//! This daemon provides:
//! - Call-state monitoring fed by the platform shim over IPC
//! - Explicit recording state machine with permission-gated capture
//! - IPC for status queries, permission round-trips and event notifications
//!
//! Scope:
//! - One call, one recording, one fixed destination file
//! - NO transcoding, upload or recording-quality settings

mod authorization;
mod capture;
mod config;
mod controller;
mod events;
mod ipc;
mod lifecycle;
mod telephony;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::authorization::PermissionBroker;
use crate::capture::{AmrFileDevice, SessionConfig};
use crate::config::Config;
use crate::controller::RecordingController;
use crate::events::RecorderEvent;
use crate::ipc::{DaemonStatus, PlatformLinks, Server};
use crate::lifecycle::ShutdownSignal;
use crate::telephony::{CallStateMonitor, TelephonyBridge};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "callrec-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.output_file, "configuration loaded");

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Create channels for inter-component communication
    // Monitor + IPC -> Recording controller
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    // Recording controller -> IPC server (status + subscribers)
    let (event_tx, _event_rx) = broadcast::channel::<RecorderEvent>(64);

    // Create the recording controller; it alone owns the capture session
    let permissions = PermissionBroker::new(event_tx.clone());
    let mut controller = RecordingController::new(
        AmrFileDevice::new(),
        permissions.clone(),
        SessionConfig::voice_call(config.output_file.clone()),
        event_tx.clone(),
    );

    // Register the call-state monitor with the telephony bridge
    let telephony = TelephonyBridge::new();
    CallStateMonitor::new(command_tx.clone()).register(&telephony);

    // Create IPC server feeding the bridge and the controller
    let links = PlatformLinks {
        telephony,
        permissions,
        commands: command_tx,
        events: event_tx.clone(),
    };
    let status = DaemonStatus::new(config.output_file.clone(), controller.state().into());
    let server = Server::new(&config.socket_path, status, links)?;

    // Subscribe to recorder events for IPC status
    let mut status_rx = event_tx.subscribe();
    let server_for_events = &server;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the controller (processes call-state and permission commands)
        _ = controller.run(command_rx) => {
            info!("recording controller exited");
        }

        // Run the IPC server (accepts platform shim and UI connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Keep the IPC status snapshot in step with the controller
        _ = async {
            loop {
                match status_rx.recv().await {
                    Ok(event) => {
                        info!(%event, "recorder event");
                        server_for_events.apply_event(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "recorder event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("recorder event handler exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    controller.teardown();
    server.shutdown().await;

    info!("callrec-daemon stopped");

    Ok(())
}
