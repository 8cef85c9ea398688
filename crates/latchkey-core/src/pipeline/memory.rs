//! In-memory leaf provider

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{DataKind, Payload, StorageNode};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Cell {
    value: Mutex<Option<Vec<u8>>>,
    offline: AtomicBool,
    operations: AtomicUsize,
}

/// Byte cell shared between clones
///
/// Clones observe the same value, which lets callers keep a handle on a
/// provider after moving it into a pipeline. Taking the cell offline makes
/// every load and store fail, standing in for an unreachable endpoint.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    cell: Arc<Cell>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider that starts offline
    pub fn failing() -> Self {
        let provider = Self::new();
        provider.set_offline(true);
        provider
    }

    pub fn with_value(value: Vec<u8>) -> Self {
        let provider = Self::new();
        provider.replace(Some(value));
        provider
    }

    pub fn set_offline(&self, offline: bool) {
        self.cell.offline.store(offline, Ordering::SeqCst);
    }

    /// Current contents without counting as an operation
    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.lock().clone()
    }

    pub fn replace(&self, value: Option<Vec<u8>>) {
        *self.lock() = value;
    }

    /// Number of load/store calls that reached this cell
    pub fn operations(&self) -> usize {
        self.cell.operations.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Vec<u8>>> {
        // A poisoned cell still holds a consistent Vec
        self.cell
            .value
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_online(&self) -> Result<()> {
        self.cell.operations.fetch_add(1, Ordering::SeqCst);
        if self.cell.offline.load(Ordering::SeqCst) {
            return Err(Error::Remote("memory provider is offline".to_string()));
        }
        Ok(())
    }
}

impl StorageNode for MemoryProvider {
    fn input_kind(&self) -> DataKind {
        DataKind::Bytes
    }

    fn load(&mut self) -> Result<Payload> {
        self.check_online()?;
        self.lock()
            .clone()
            .map(Payload::Bytes)
            .ok_or_else(|| Error::Remote("memory provider is empty".to_string()))
    }

    fn store(&mut self, value: Payload) -> Result<()> {
        self.check_online()?;
        let bytes = value.into_bytes()?;
        *self.lock() = Some(bytes);
        Ok(())
    }
}
