//! IPC module for platform shim and UI communication

mod protocol;
mod server;

pub use protocol::DaemonStatus;
pub use server::{PlatformLinks, Server};
