//! Latchkey Core - storage pipeline, cipher formats and session layer
//!
//! This crate provides the pieces every Latchkey front-end shares:
//! - A composable storage pipeline whose stages declare the representation
//!   they consume and produce, checked when the chain is assembled
//! - The scrypt + AES-CBC store format and the legacy scrypt envelope
//! - A replica provider pairing a remote endpoint with a local cache
//! - RSA-signed remote synchronization
//! - The in-memory secret store and the session that owns it

pub mod config;
pub mod error;
pub mod legacy;
pub mod pipeline;
pub mod remote;
pub mod session;
pub mod store;

pub use config::{ScryptSettings, StoreConfig, StoreFormat};
pub use error::{Error, Result};
pub use legacy::{migrate_legacy, LegacyDatabase, Login};
pub use pipeline::{DataKind, Payload, PipelineBuilder, Stage, StorageNode, Transformer};
pub use remote::{KeySlot, RemoteProvider, SigningIdentity};
pub use session::Session;
pub use store::{PasswordEntry, SecretStore, MERGE_SEPARATOR};

/// Schema version written by `Session::init_empty`
pub const STORE_VERSION: u32 = 0;

/// RSA modulus size for remote signing identities
pub const KEY_BITS: usize = 2048;
