//! The last accepted upload and its on-disk copy

use latchkey_core::pipeline::FileProvider;
use latchkey_core::remote::{encode_blocks, read_blocks};
use latchkey_core::{Payload, StorageNode};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, SyncError};

/// Public key (PKCS#1 DER) that signed the payload, and the payload itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub public_key: Vec<u8>,
    pub payload: Vec<u8>,
}

impl Record {
    /// Short hex digest of the public key, for logs
    pub fn key_fingerprint(&self) -> String {
        fingerprint(&self.public_key)
    }
}

pub fn fingerprint(public_key_der: &[u8]) -> String {
    hex::encode(&Sha256::digest(public_key_der)[..8])
}

/// Holds the current [`Record`], mirrored to a data file when one is set
///
/// The file is two length-prefixed blocks, key then payload, replaced
/// atomically on every accepted upload.
#[derive(Debug, Default)]
pub struct RecordStore {
    file: Option<FileProvider>,
    current: Option<Record>,
}

impl RecordStore {
    /// Store with no backing file; state is lost on exit
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the data file, loading the record it holds if it exists
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = FileProvider::new(path);
        let current = if file.path().exists() {
            let data = file.load()?.into_bytes()?;
            let [public_key, payload] = read_blocks::<2>(&data)
                .map_err(|e| SyncError::CorruptRecord(e.to_string()))?;
            let record = Record {
                public_key: public_key.to_vec(),
                payload: payload.to_vec(),
            };
            info!(
                "Loaded record from {:?}: key {}, {} bytes",
                file.path(),
                record.key_fingerprint(),
                record.payload.len()
            );
            Some(record)
        } else {
            debug!("No record file at {:?}", file.path());
            None
        };
        Ok(Self {
            file: Some(file),
            current,
        })
    }

    pub fn current(&self) -> Option<&Record> {
        self.current.as_ref()
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|r| r.payload.as_slice())
    }

    pub fn accepted_key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|r| r.public_key.as_slice())
    }

    /// Persist `record`, then make it current. On a write failure the
    /// previous record stays current.
    pub fn replace(&mut self, record: Record) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            let data = encode_blocks(&[record.public_key.as_slice(), record.payload.as_slice()])?;
            file.store(Payload::Bytes(data))?;
        }
        self.current = Some(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(key: &[u8], payload: &[u8]) -> Record {
        Record {
            public_key: key.to_vec(),
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path().join("db")).unwrap();
        assert!(store.current().is_none());
        assert!(!dir.path().join("db").exists());
    }

    #[test]
    fn test_replace_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");

        let mut store = RecordStore::open(&path).unwrap();
        store.replace(record(b"key-one", b"first")).unwrap();
        store.replace(record(b"key-one", b"second")).unwrap();

        let reopened = RecordStore::open(&path).unwrap();
        assert_eq!(reopened.current(), Some(&record(b"key-one", b"second")));
        assert_eq!(reopened.accepted_key(), Some(b"key-one".as_slice()));
    }

    #[test]
    fn test_file_layout_is_two_blocks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        let mut store = RecordStore::open(&path).unwrap();
        store.replace(record(b"k", b"pl")).unwrap();

        assert_eq!(
            std::fs::read(&path).unwrap(),
            vec![0, 0, 0, 1, b'k', 0, 0, 0, 2, b'p', b'l']
        );
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        std::fs::write(&path, [0, 0, 0, 9, 1, 2]).unwrap();
        assert!(matches!(
            RecordStore::open(&path),
            Err(SyncError::CorruptRecord(_))
        ));
    }

    #[test]
    fn test_in_memory_keeps_record() {
        let mut store = RecordStore::in_memory();
        store.replace(record(b"k", b"data")).unwrap();
        assert_eq!(store.payload(), Some(b"data".as_slice()));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_eq!(fingerprint(b"abc").len(), 16);
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
    }
}
