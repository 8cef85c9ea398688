//! First-generation login database and its migration

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::pipeline::{Payload, StorageNode};
use crate::session::Session;

/// A stored login: name plus newline-delimited data
///
/// The first line of `data` is the password, anything after it is notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Login {
    pub name: String,
    pub data: String,
}

impl Login {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    pub fn password(&self) -> &str {
        self.data.split('\n').next().unwrap_or_default()
    }

    pub fn notes(&self) -> Option<&str> {
        self.data.split_once('\n').map(|(_, notes)| notes)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LegacyDocument {
    #[serde(default)]
    logins: Vec<Login>,
}

struct State {
    document: LegacyDocument,
    dirty: bool,
}

/// Append-only login list persisted through a storage pipeline
///
/// The list and its dirty flag share one lock. A fresh database counts as
/// dirty so the first save creates the store.
pub struct LegacyDatabase {
    state: Mutex<State>,
    node: Mutex<Box<dyn StorageNode>>,
}

impl LegacyDatabase {
    pub fn new(node: Box<dyn StorageNode>) -> Self {
        Self {
            state: Mutex::new(State {
                document: LegacyDocument::default(),
                dirty: true,
            }),
            node: Mutex::new(node),
        }
    }

    pub fn load(&self) -> Result<()> {
        let doc = self.node().load()?.into_document()?;
        let document: LegacyDocument = serde_json::from_value(doc)
            .map_err(|e| Error::Decode(format!("malformed login database: {}", e)))?;
        let mut state = self.state();
        debug!("Loaded {} legacy logins", document.logins.len());
        state.document = document;
        state.dirty = false;
        Ok(())
    }

    /// Persist when something changed since the last load or save
    pub fn save(&self) -> Result<()> {
        let mut state = self.state();
        if !state.dirty {
            return Ok(());
        }
        let doc = serde_json::to_value(&state.document)?;
        self.node().store(Payload::Document(doc))?;
        state.dirty = false;
        Ok(())
    }

    pub fn add_login(&self, login: Login) {
        let mut state = self.state();
        state.document.logins.push(login);
        state.dirty = true;
    }

    /// Snapshot of the logins in insertion order
    pub fn logins(&self) -> Vec<Login> {
        self.state().document.logins.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.state().dirty
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn node(&self) -> MutexGuard<'_, Box<dyn StorageNode>> {
        self.node.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Copy every legacy login into `session`, merging duplicate names
///
/// The whole login data (password line plus notes) becomes the secret.
/// Nothing is persisted; the caller saves the session afterwards.
pub fn migrate_legacy(database: &LegacyDatabase, session: &mut Session) -> Result<usize> {
    let logins = database.logins();
    for login in &logins {
        session.import_password(&login.name, &login.data)?;
    }
    info!("Migrated {} legacy logins", logins.len());
    Ok(logins.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{JsonCodec, MemoryProvider, PipelineBuilder, Utf8Codec};

    fn database(memory: &MemoryProvider) -> LegacyDatabase {
        let node = PipelineBuilder::on(memory.clone())
            .then(Utf8Codec)
            .unwrap()
            .then(JsonCodec)
            .unwrap()
            .build();
        LegacyDatabase::new(node)
    }

    #[test]
    fn test_login_password_is_first_line() {
        let login = Login::new("bank", "s3cret\nuser: me\npin: 1234");
        assert_eq!(login.password(), "s3cret");
        assert_eq!(login.notes(), Some("user: me\npin: 1234"));
        assert_eq!(Login::new("x", "only").notes(), None);
    }

    #[test]
    fn test_save_only_when_dirty() {
        let memory = MemoryProvider::new();
        let db = database(&memory);
        db.add_login(Login::new("a", "1"));
        db.save().unwrap();
        let ops = memory.operations();

        db.save().unwrap();
        assert_eq!(memory.operations(), ops);

        db.add_login(Login::new("b", "2"));
        db.save().unwrap();
        assert_eq!(memory.operations(), ops + 1);
    }

    #[test]
    fn test_load_replaces_list_and_clears_dirty() {
        let memory = MemoryProvider::new();
        let writer = database(&memory);
        writer.add_login(Login::new("a", "1"));
        writer.add_login(Login::new("b", "2\nnote"));
        writer.save().unwrap();

        let reader = database(&memory);
        assert!(reader.is_dirty());
        reader.load().unwrap();
        assert!(!reader.is_dirty());
        let names: Vec<_> = reader.logins().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
