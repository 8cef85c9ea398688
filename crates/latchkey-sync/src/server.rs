//! HTTP surface: `GET /` serves the accepted payload, `PUT /` replaces it

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use latchkey_core::remote::{decode_public_key, encode_public_key, read_blocks, verify_signature};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::error::{Result, SyncError};
use crate::record::{fingerprint, Record, RecordStore};

/// Largest accepted upload
pub const MAX_UPLOAD: usize = 64 * 1024 * 1024;

/// Shared server state
pub struct SyncState {
    records: Mutex<RecordStore>,
}

impl SyncState {
    pub fn new(records: RecordStore) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    fn records(&self) -> MutexGuard<'_, RecordStore> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn payload(&self) -> Option<Vec<u8>> {
        self.records().payload().map(|p| p.to_vec())
    }

    /// Check and apply one upload: `block(public key DER) block(signature)
    /// block(payload)`. Returns the key fingerprint on success.
    ///
    /// Once a key has been accepted, only uploads signed by that same key
    /// are taken.
    pub fn accept_upload(&self, body: &[u8]) -> Result<String> {
        let [key_der, signature, payload] = read_blocks::<3>(body)?;
        let key = decode_public_key(key_der)?;
        let canonical = encode_public_key(&key)?;

        let mut records = self.records();
        if let Some(accepted) = records.accepted_key() {
            if accepted != canonical.as_slice() {
                return Err(SyncError::KeyMismatch);
            }
        }
        verify_signature(&key, payload, signature).map_err(|_| SyncError::BadSignature)?;

        let fingerprint = fingerprint(&canonical);
        records.replace(Record {
            public_key: canonical,
            payload: payload.to_vec(),
        })?;
        Ok(fingerprint)
    }
}

/// Build the router over `state`
pub fn router(state: Arc<SyncState>) -> Router {
    Router::new()
        .route("/", get(get_payload).put(put_payload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD))
        .with_state(state)
}

async fn get_payload(State(state): State<Arc<SyncState>>) -> Response {
    match state.payload() {
        Some(payload) => (StatusCode::OK, payload).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn put_payload(State(state): State<Arc<SyncState>>, body: Bytes) -> StatusCode {
    let result = tokio::task::spawn_blocking(move || state.accept_upload(&body)).await;
    match result {
        Ok(Ok(fingerprint)) => {
            info!("Accepted upload signed by {}", fingerprint);
            StatusCode::OK
        }
        Ok(Err(e @ (SyncError::KeyMismatch | SyncError::BadSignature))) => {
            warn!("Rejected upload: {}", e);
            StatusCode::FORBIDDEN
        }
        Ok(Err(e)) => {
            error!("Upload failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(e) => {
            error!("Upload task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
