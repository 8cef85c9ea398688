//! Key-exchange stage: carries the signing identity inside the store

use tracing::info;

use super::{encode_blocks, read_blocks, KeySlot, SigningIdentity};
use crate::error::Result;
use crate::pipeline::{DataKind, Payload, Stage};

/// Prepends `block(private DER) block(public DER)` to the payload
///
/// Decoding installs the bundled identity into the shared [`KeySlot`] so the
/// remote provider further down can sign the next write. Encoding generates
/// a key pair the first time the slot is found empty.
pub struct KeyExchange {
    keys: KeySlot,
    bits: usize,
}

impl KeyExchange {
    pub fn new(keys: KeySlot, bits: usize) -> Self {
        Self { keys, bits }
    }
}

impl Stage for KeyExchange {
    fn input_kind(&self) -> DataKind {
        DataKind::Bytes
    }

    fn output_kind(&self) -> DataKind {
        DataKind::Bytes
    }

    fn encode(&mut self, value: Payload) -> Result<Payload> {
        let body = value.into_bytes()?;
        let identity = match self.keys.get() {
            Some(identity) => identity,
            None => {
                info!("Generating {}-bit signing identity", self.bits);
                let identity = SigningIdentity::generate(self.bits)?;
                self.keys.set(identity.clone());
                identity
            }
        };
        let private = identity.private_der()?;
        let public = identity.public_der()?;
        Ok(Payload::Bytes(encode_blocks(&[
            private.as_slice(),
            public.as_slice(),
            body.as_slice(),
        ])?))
    }

    fn decode(&mut self, value: Payload) -> Result<Payload> {
        let data = value.into_bytes()?;
        let [private, public, body] = read_blocks::<3>(&data)?;
        self.keys.set(SigningIdentity::from_der(private, public)?);
        Ok(Payload::Bytes(body.to_vec()))
    }
}
