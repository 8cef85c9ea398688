//! Error types for the Latchkey core library

use thiserror::Error;

use crate::pipeline::DataKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Two adjacent pipeline nodes disagree on the representation they exchange
    #[error("Output kind {output} is incompatible with following input kind {input}")]
    KindMismatch { output: DataKind, input: DataKind },

    /// A node received a payload of a kind it does not accept
    #[error("Expected {expected} payload, got {actual}")]
    UnexpectedPayload { expected: DataKind, actual: DataKind },

    /// Wrong password, tampered or truncated data. Deliberately undifferentiated.
    #[error("Unable to decode store: {0}")]
    Decode(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// The last load was served from the local replica
    #[error("Remote load was not successful, refusing to store stale data")]
    Stale,

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Remote rejected request with status {0}")]
    RemoteStatus(u16),

    #[error("No signing identity available for remote store")]
    MissingIdentity,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("No password stored under {0:?}")]
    NotFound(String),

    #[error("Store format {0} is not supported here")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Error::RemoteStatus(status.as_u16()),
            None => Error::Remote(e.to_string()),
        }
    }
}
