//! Error types for the sync server

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Block framing, key decoding or signature failures from the core library
    #[error(transparent)]
    Core(#[from] latchkey_core::Error),

    /// The upload is signed by a key other than the accepted one
    #[error("Upload signed by a key other than the accepted one")]
    KeyMismatch,

    #[error("Upload signature does not verify")]
    BadSignature,

    #[error("Corrupt record file: {0}")]
    CorruptRecord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
