//! Latchkey Daemon - shared access to the unlocked secret store
//!
//! This crate provides:
//! - A Unix socket IPC server exposing the session operations
//! - Single-instance startup through a PID marker
//! - An idle watchdog that shuts the daemon down after inactivity
//! - The IPC client, which starts the daemon on demand

pub mod config;
pub mod error;
pub mod ipc;
pub mod lifecycle;
pub mod state;
pub mod watchdog;

pub use config::DaemonConfig;
pub use error::{DaemonError, Result};
pub use ipc::{FrameOrder, IpcClient, IpcRequest, IpcResponse, IpcServer, Operation};
pub use lifecycle::{Claim, Daemon, PidMarker};
pub use state::DaemonState;
pub use watchdog::ActivityTracker;
