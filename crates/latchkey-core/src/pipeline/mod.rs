//! Composable storage pipeline
//!
//! A pipeline is a chain of [`StorageNode`]s. Leaves (files, remote
//! endpoints, memory cells) persist a value; a [`Transformer`] wraps exactly
//! one downstream node and converts between two representations through a
//! [`Stage`]. `load` pulls from downstream and converts outward, `store`
//! converts inward and pushes downstream.
//!
//! Each node declares the [`DataKind`] it accepts, and each stage declares
//! both its input and output kinds. Wrapping a node whose input kind does not
//! match the stage's output kind fails immediately, so a malformed chain never
//! reaches any I/O.

mod cipher;
mod codec;
mod envelope;
mod file;
mod memory;
mod replica;

pub use cipher::{
    decrypt, encrypt, CipherHeader, ScryptAesCipher, ScryptParams, HEADER_LEN, MAX_LOG_N,
};
pub use codec::{GzipCodec, JsonCodec, Utf8Codec};
pub use envelope::{open_envelope, seal_envelope, ScryptEnvelope};
pub use file::FileProvider;
pub use memory::MemoryProvider;
pub use replica::Replica;

use std::fmt;

use crate::error::{Error, Result};

/// Representation exchanged between two pipeline nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// Structured document (the parsed store)
    Document,
    /// UTF-8 text
    Text,
    /// Raw bytes
    Bytes,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataKind::Document => "document",
            DataKind::Text => "text",
            DataKind::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// A value travelling through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Document(serde_json::Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn kind(&self) -> DataKind {
        match self {
            Payload::Document(_) => DataKind::Document,
            Payload::Text(_) => DataKind::Text,
            Payload::Bytes(_) => DataKind::Bytes,
        }
    }

    pub fn into_document(self) -> Result<serde_json::Value> {
        match self {
            Payload::Document(value) => Ok(value),
            other => Err(other.mismatch(DataKind::Document)),
        }
    }

    pub fn into_text(self) -> Result<String> {
        match self {
            Payload::Text(text) => Ok(text),
            other => Err(other.mismatch(DataKind::Text)),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Payload::Bytes(bytes) => Ok(bytes),
            other => Err(other.mismatch(DataKind::Bytes)),
        }
    }

    fn mismatch(&self, expected: DataKind) -> Error {
        Error::UnexpectedPayload {
            expected,
            actual: self.kind(),
        }
    }
}

/// A node in the storage pipeline
pub trait StorageNode: Send {
    /// Kind accepted by `store` and returned by `load`
    fn input_kind(&self) -> DataKind;

    /// Load the current value
    fn load(&mut self) -> Result<Payload>;

    /// Persist a value
    fn store(&mut self, value: Payload) -> Result<()>;

    /// Whether this node (or something below it) writes durable state
    fn is_persistent(&self) -> bool {
        false
    }
}

/// A conversion between two representations
pub trait Stage: Send {
    /// Kind this stage exposes to the node above it
    fn input_kind(&self) -> DataKind;

    /// Kind this stage hands to the node below it
    fn output_kind(&self) -> DataKind;

    /// Convert inward, on the way to storage
    fn encode(&mut self, value: Payload) -> Result<Payload>;

    /// Convert outward, on the way back from storage
    fn decode(&mut self, value: Payload) -> Result<Payload>;
}

/// A stage bound to the node it delegates persistence to
pub struct Transformer {
    stage: Box<dyn Stage>,
    next: Box<dyn StorageNode>,
}

impl Transformer {
    /// Wrap `next` with `stage`, rejecting incompatible kinds
    pub fn new(stage: Box<dyn Stage>, next: Box<dyn StorageNode>) -> Result<Self> {
        if stage.output_kind() != next.input_kind() {
            return Err(Error::KindMismatch {
                output: stage.output_kind(),
                input: next.input_kind(),
            });
        }
        Ok(Self { stage, next })
    }
}

impl StorageNode for Transformer {
    fn input_kind(&self) -> DataKind {
        self.stage.input_kind()
    }

    fn load(&mut self) -> Result<Payload> {
        let inner = self.next.load()?;
        self.stage.decode(inner)
    }

    fn store(&mut self, value: Payload) -> Result<()> {
        let inner = self.stage.encode(value)?;
        self.next.store(inner)
    }

    fn is_persistent(&self) -> bool {
        self.next.is_persistent()
    }
}

/// Declarative assembly of a pipeline, innermost node first
///
/// ```
/// use latchkey_core::pipeline::{GzipCodec, JsonCodec, MemoryProvider, PipelineBuilder, Utf8Codec};
///
/// let pipeline = PipelineBuilder::on(MemoryProvider::new())
///     .then(GzipCodec::default())?
///     .then(Utf8Codec)?
///     .then(JsonCodec)?
///     .build();
/// # Ok::<(), latchkey_core::Error>(())
/// ```
pub struct PipelineBuilder {
    top: Box<dyn StorageNode>,
}

impl PipelineBuilder {
    /// Start from a leaf (or an already assembled node)
    pub fn on<N: StorageNode + 'static>(node: N) -> Self {
        Self {
            top: Box::new(node),
        }
    }

    /// Start from a boxed node
    pub fn on_boxed(node: Box<dyn StorageNode>) -> Self {
        Self { top: node }
    }

    /// Wrap the current top with another stage
    pub fn then<S: Stage + 'static>(self, stage: S) -> Result<Self> {
        let top = Transformer::new(Box::new(stage), self.top)?;
        Ok(Self { top: Box::new(top) })
    }

    pub fn build(self) -> Box<dyn StorageNode> {
        self.top
    }
}
