//! HTTP leaf provider talking to the sync server

use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, info};

use super::{encode_blocks, KeySlot};
use crate::error::{Error, Result};
use crate::pipeline::{DataKind, Payload, StorageNode};

/// Loads with `GET`, stores with a signed `PUT`
///
/// The signing identity is read from a [`KeySlot`] at store time, so the
/// slot can be filled after the pipeline is assembled.
#[derive(Debug, Clone)]
pub struct RemoteProvider {
    address: String,
    keys: KeySlot,
}

impl RemoteProvider {
    pub fn new(address: impl Into<String>, keys: KeySlot) -> Self {
        Self {
            address: address.into(),
            keys,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn keys(&self) -> &KeySlot {
        &self.keys
    }

    /// Build the signed request body for `payload`
    pub fn signed_body(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let identity = self.keys.get().ok_or(Error::MissingIdentity)?;
        let public = identity.public_der()?;
        let signature = identity.sign(payload)?;
        encode_blocks(&[public.as_slice(), signature.as_slice(), payload])
    }

    // Built per call: a blocking client must not be dropped inside an async context
    fn client() -> Result<Client> {
        Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| Error::Remote(format!("http client: {}", e)))
    }
}

impl StorageNode for RemoteProvider {
    fn input_kind(&self) -> DataKind {
        DataKind::Bytes
    }

    fn load(&mut self) -> Result<Payload> {
        let response = Self::client()?.get(&self.address).send()?.error_for_status()?;
        let body = response.bytes()?;
        debug!("Fetched {} bytes from {}", body.len(), self.address);
        Ok(Payload::Bytes(body.to_vec()))
    }

    fn store(&mut self, value: Payload) -> Result<()> {
        let payload = value.into_bytes()?;
        let body = self.signed_body(&payload)?;
        Self::client()?
            .put(&self.address)
            .body(body)
            .send()?
            .error_for_status()?;
        info!("Pushed {} bytes to {}", payload.len(), self.address);
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        true
    }
}
