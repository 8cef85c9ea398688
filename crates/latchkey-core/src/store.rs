//! In-memory secret store

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::STORE_VERSION;

/// Appended between an existing secret and an imported one with the same name
pub const MERGE_SEPARATOR: &str = "\n###\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordEntry {
    pub password: String,
}

/// The decrypted store: `{ "version": 0, "passwords": { name: { "password": .. } } }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretStore {
    pub version: u32,
    #[serde(default)]
    pub passwords: BTreeMap<String, PasswordEntry>,
}

impl Default for SecretStore {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            passwords: BTreeMap::new(),
        }
    }
}

impl SecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(doc: serde_json::Value) -> Result<Self> {
        serde_json::from_value(doc).map_err(|e| Error::Decode(format!("malformed store: {}", e)))
    }

    pub fn to_document(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Insert or overwrite
    pub fn insert(&mut self, name: &str, password: &str) {
        self.passwords.insert(
            name.to_string(),
            PasswordEntry {
                password: password.to_string(),
            },
        );
    }

    /// Insert, or append to an existing secret behind [`MERGE_SEPARATOR`]
    pub fn merge(&mut self, name: &str, password: &str) {
        match self.passwords.get_mut(name) {
            Some(entry) => {
                entry.password.push_str(MERGE_SEPARATOR);
                entry.password.push_str(password);
            }
            None => self.insert(name, password),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.passwords.get(name).map(|e| e.password.as_str())
    }

    /// Names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.passwords.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.passwords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passwords.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_shape() {
        let mut store = SecretStore::new();
        store.insert("mail", "x");
        assert_eq!(
            store.to_document().unwrap(),
            serde_json::json!({ "version": 0, "passwords": { "mail": { "password": "x" } } })
        );
    }

    #[test]
    fn test_merge_appends_with_separator() {
        let mut store = SecretStore::new();
        store.merge("a", "1");
        store.merge("a", "2");
        store.merge("b", "3");
        assert_eq!(store.get("a"), Some("1\n###\n2"));
        assert_eq!(store.get("b"), Some("3"));
    }

    #[test]
    fn test_malformed_document_is_decode_error() {
        let err = SecretStore::from_document(serde_json::json!({ "passwords": [] })).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_names_sorted() {
        let mut store = SecretStore::new();
        for name in ["zeta", "alpha", "mid"] {
            store.insert(name, "pw");
        }
        assert_eq!(store.names(), vec!["alpha", "mid", "zeta"]);
    }
}
