//! Latchkey CLI
//!
//! Typed access to the daemon's session operations, plus the offline
//! store commands (init, export, import, migrate) that open the store
//! directly.

pub mod client;
pub mod commands;

pub use client::{ClientError, Result, VaultClient};
pub use commands::{export_store, import_store, init_store, migrate_store, run, Cli, Commands};
