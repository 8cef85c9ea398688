//! Logged-in view of the secret store

use tracing::{debug, info};

use crate::config::{StoreConfig, StoreFormat};
use crate::error::{Error, Result};
use crate::pipeline::{Payload, StorageNode};
use crate::store::SecretStore;

/// Owns the storage pipeline and the decrypted store
///
/// A session is logged in once it holds a store, either loaded through the
/// pipeline or created empty. Mutations change only the in-memory copy until
/// [`save`](Session::save) pushes it through the pipeline.
pub struct Session {
    config: StoreConfig,
    pipeline: Option<Box<dyn StorageNode>>,
    store: Option<SecretStore>,
}

impl Session {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            pipeline: None,
            store: None,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Build the pipeline for `password` and, when `load`, read the store
    ///
    /// A wrong password or corrupted store surfaces as [`Error::Decode`];
    /// the session then stays logged out.
    pub fn log_in(&mut self, password: &str, load: bool) -> Result<()> {
        if self.config.format == StoreFormat::Legacy {
            return Err(Error::UnsupportedFormat(self.config.format.to_string()));
        }
        let mut pipeline = self.config.build_pipeline(password)?;
        if load {
            let doc = pipeline.load()?.into_document()?;
            let store = SecretStore::from_document(doc)?;
            info!("Loaded store with {} entries", store.len());
            self.store = Some(store);
        }
        self.pipeline = Some(pipeline);
        Ok(())
    }

    /// Start from an empty store without loading anything
    pub fn init_empty(&mut self) {
        self.store = Some(SecretStore::new());
    }

    pub fn is_logged_in(&self) -> bool {
        self.store.is_some()
    }

    pub fn save(&mut self) -> Result<()> {
        let doc = self.store()?.to_document()?;
        let pipeline = self.pipeline.as_mut().ok_or(Error::NotLoggedIn)?;
        pipeline.store(Payload::Document(doc))?;
        debug!("Saved store");
        Ok(())
    }

    pub fn list_password_names(&self) -> Result<Vec<String>> {
        Ok(self.store()?.names())
    }

    pub fn add_password(&mut self, name: &str, password: &str, save: bool) -> Result<()> {
        self.store_mut()?.insert(name, password);
        if save {
            self.save()?;
        }
        Ok(())
    }

    /// Add `password`, appending to an existing secret of the same name
    pub fn import_password(&mut self, name: &str, password: &str) -> Result<()> {
        self.store_mut()?.merge(name, password);
        Ok(())
    }

    pub fn get_password(&self, name: &str) -> Result<String> {
        self.store()?
            .get(name)
            .map(str::to_string)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Plain copy of the whole store, for export
    pub fn export_store(&self) -> Result<SecretStore> {
        Ok(self.store()?.clone())
    }

    /// Replace the in-memory store wholesale, for import
    pub fn replace_store(&mut self, store: SecretStore) {
        self.store = Some(store);
    }

    fn store(&self) -> Result<&SecretStore> {
        self.store.as_ref().ok_or(Error::NotLoggedIn)
    }

    fn store_mut(&mut self) -> Result<&mut SecretStore> {
        self.store.as_mut().ok_or(Error::NotLoggedIn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScryptSettings;
    use std::path::Path;

    fn config(path: &Path) -> StoreConfig {
        StoreConfig {
            scrypt: ScryptSettings {
                log_n: 4,
                r: 8,
                p: 1,
            },
            ..StoreConfig::local(StoreFormat::Derived, path)
        }
    }

    #[test]
    fn test_operations_require_login() {
        let mut session = Session::new(config(Path::new("/nonexistent/store")));
        assert!(!session.is_logged_in());
        assert!(matches!(session.list_password_names(), Err(Error::NotLoggedIn)));
        assert!(matches!(session.get_password("x"), Err(Error::NotLoggedIn)));
        assert!(matches!(
            session.add_password("x", "y", false),
            Err(Error::NotLoggedIn)
        ));
        assert!(matches!(session.save(), Err(Error::NotLoggedIn)));
    }

    #[test]
    fn test_init_add_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store");

        let mut session = Session::new(config(&path));
        session.log_in("pw", false).unwrap();
        assert!(!session.is_logged_in());
        session.init_empty();
        session.add_password("mail", "m41l", true).unwrap();

        let mut reopened = Session::new(config(&path));
        reopened.log_in("pw", true).unwrap();
        assert_eq!(reopened.list_password_names().unwrap(), vec!["mail"]);
        assert_eq!(reopened.get_password("mail").unwrap(), "m41l");
    }

    #[test]
    fn test_unsaved_add_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store");

        let mut session = Session::new(config(&path));
        session.log_in("pw", false).unwrap();
        session.init_empty();
        session.save().unwrap();
        session.add_password("draft", "x", false).unwrap();
        assert_eq!(session.get_password("draft").unwrap(), "x");

        let mut reopened = Session::new(config(&path));
        reopened.log_in("pw", true).unwrap();
        assert!(matches!(reopened.get_password("draft"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_wrong_password_stays_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store");

        let mut session = Session::new(config(&path));
        session.log_in("right", false).unwrap();
        session.init_empty();
        session.add_password("a", "b", true).unwrap();

        let mut other = Session::new(config(&path));
        assert!(other.log_in("wrong", true).is_err());
        assert!(!other.is_logged_in());
    }

    #[test]
    fn test_legacy_format_rejected() {
        let mut session = Session::new(StoreConfig::local(StoreFormat::Legacy, "unused"));
        assert!(matches!(
            session.log_in("pw", false),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_import_merges_and_export_copies() {
        let mut session = Session::new(config(Path::new("unused")));
        session.init_empty();
        session.import_password("a", "1").unwrap();
        session.import_password("a", "2").unwrap();
        assert_eq!(session.get_password("a").unwrap(), "1\n###\n2");

        let exported = session.export_store().unwrap();
        let mut fresh = Session::new(config(Path::new("unused")));
        fresh.replace_store(exported);
        assert_eq!(fresh.get_password("a").unwrap(), "1\n###\n2");
    }
}
