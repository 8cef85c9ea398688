//! Encoding stages: structured serialization, text encoding, compression

use std::io::{Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};

use super::{DataKind, Payload, Stage};
use crate::error::{Error, Result};

/// Document ⇄ JSON text
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Stage for JsonCodec {
    fn input_kind(&self) -> DataKind {
        DataKind::Document
    }

    fn output_kind(&self) -> DataKind {
        DataKind::Text
    }

    fn encode(&mut self, value: Payload) -> Result<Payload> {
        let doc = value.into_document()?;
        Ok(Payload::Text(serde_json::to_string(&doc)?))
    }

    fn decode(&mut self, value: Payload) -> Result<Payload> {
        let text = value.into_text()?;
        let doc = serde_json::from_str(&text)
            .map_err(|e| Error::Decode(format!("invalid JSON: {}", e)))?;
        Ok(Payload::Document(doc))
    }
}

/// Text ⇄ UTF-8 bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Codec;

impl Stage for Utf8Codec {
    fn input_kind(&self) -> DataKind {
        DataKind::Text
    }

    fn output_kind(&self) -> DataKind {
        DataKind::Bytes
    }

    fn encode(&mut self, value: Payload) -> Result<Payload> {
        Ok(Payload::Bytes(value.into_text()?.into_bytes()))
    }

    fn decode(&mut self, value: Payload) -> Result<Payload> {
        let text = String::from_utf8(value.into_bytes()?)
            .map_err(|e| Error::Decode(format!("invalid UTF-8: {}", e)))?;
        Ok(Payload::Text(text))
    }
}

/// Gzip compression of raw bytes
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    level: Compression,
}

impl GzipCodec {
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level),
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Stage for GzipCodec {
    fn input_kind(&self) -> DataKind {
        DataKind::Bytes
    }

    fn output_kind(&self) -> DataKind {
        DataKind::Bytes
    }

    fn encode(&mut self, value: Payload) -> Result<Payload> {
        let raw = value.into_bytes()?;
        let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), self.level);
        encoder.write_all(&raw)?;
        Ok(Payload::Bytes(encoder.finish()?))
    }

    fn decode(&mut self, value: Payload) -> Result<Payload> {
        let compressed = value.into_bytes()?;
        let mut decoder = GzDecoder::new(compressed.as_slice());
        let mut raw = Vec::new();
        decoder
            .read_to_end(&mut raw)
            .map_err(|e| Error::Decode(format!("invalid gzip stream: {}", e)))?;
        Ok(Payload::Bytes(raw))
    }
}
