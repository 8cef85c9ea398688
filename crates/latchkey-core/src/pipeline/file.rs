//! Whole-file leaf provider

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{DataKind, Payload, StorageNode};
use crate::error::Result;

/// Reads and writes a single file as one blob
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so readers never observe a half-written store.
#[derive(Debug, Clone)]
pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StorageNode for FileProvider {
    fn input_kind(&self) -> DataKind {
        DataKind::Bytes
    }

    fn load(&mut self) -> Result<Payload> {
        let data = std::fs::read(&self.path)?;
        debug!("Loaded {} bytes from {:?}", data.len(), self.path);
        Ok(Payload::Bytes(data))
    }

    fn store(&mut self, value: Payload) -> Result<()> {
        let data = value.into_bytes()?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let temp_path = self.temp_path();
        std::fs::write(&temp_path, &data)?;
        std::fs::rename(&temp_path, &self.path)?;
        debug!("Stored {} bytes to {:?}", data.len(), self.path);
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        true
    }
}
