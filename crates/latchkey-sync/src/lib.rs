//! Latchkey Sync - remote store server
//!
//! Accepts RSA-signed uploads of an encrypted store and serves the last
//! accepted one back. The first key to upload is pinned; later uploads
//! must be signed by it.

pub mod error;
pub mod record;
pub mod server;

pub use error::{Result, SyncError};
pub use record::{Record, RecordStore};
pub use server::{router, SyncState, MAX_UPLOAD};
