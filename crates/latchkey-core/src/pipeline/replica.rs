//! Remote + local replica provider

use tracing::{info, warn};

use super::{DataKind, Payload, StorageNode};
use crate::error::{Error, Result};

/// Pairs an upstream node with a local cache of the same kind
///
/// Loads prefer upstream and mirror the result locally; when upstream fails
/// the cached copy is served instead. Stores are refused after such a
/// fallback until upstream has been loaded successfully again, so a write
/// based on a possibly outdated copy never replaces the remote state.
pub struct Replica {
    upstream: Box<dyn StorageNode>,
    local: Box<dyn StorageNode>,
    remote_available: bool,
}

impl Replica {
    pub fn new(upstream: Box<dyn StorageNode>, local: Box<dyn StorageNode>) -> Result<Self> {
        if upstream.input_kind() != local.input_kind() {
            return Err(Error::KindMismatch {
                output: upstream.input_kind(),
                input: local.input_kind(),
            });
        }
        Ok(Self {
            upstream,
            local,
            remote_available: true,
        })
    }

    /// Whether the most recent load was served by upstream
    pub fn remote_available(&self) -> bool {
        self.remote_available
    }
}

impl StorageNode for Replica {
    fn input_kind(&self) -> DataKind {
        self.upstream.input_kind()
    }

    fn load(&mut self) -> Result<Payload> {
        match self.upstream.load() {
            Ok(value) => {
                self.local.store(value.clone())?;
                self.remote_available = true;
                Ok(value)
            }
            Err(e) => {
                warn!("Remote load failed, falling back to local copy: {}", e);
                self.remote_available = false;
                self.local.load()
            }
        }
    }

    fn store(&mut self, value: Payload) -> Result<()> {
        if !self.remote_available {
            return Err(Error::Stale);
        }
        self.local.store(value.clone())?;
        self.upstream.store(value)?;
        info!("Stored to local replica and remote");
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        self.upstream.is_persistent() || self.local.is_persistent()
    }
}
