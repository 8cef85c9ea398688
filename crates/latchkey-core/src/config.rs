//! Store configuration and pipeline factory

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::pipeline::{
    FileProvider, GzipCodec, JsonCodec, PipelineBuilder, Replica, ScryptAesCipher, ScryptEnvelope,
    ScryptParams, StorageNode, Utf8Codec,
};
use crate::remote::{KeyExchange, KeySlot, RemoteProvider, SigningIdentity};
use crate::KEY_BITS;

/// On-disk store generation, always chosen explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFormat {
    /// Signing identity derived from the remote address and password
    #[default]
    Derived,
    /// Signing identity generated once and bundled inside the ciphertext
    Bundled,
    /// First-generation plain scrypt envelope, local file only
    Legacy,
}

impl fmt::Display for StoreFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreFormat::Derived => "derived",
            StoreFormat::Bundled => "bundled",
            StoreFormat::Legacy => "legacy",
        };
        f.write_str(name)
    }
}

/// scrypt cost for newly written blobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScryptSettings {
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl Default for ScryptSettings {
    fn default() -> Self {
        let params = ScryptParams::default();
        Self {
            log_n: params.log_n,
            r: params.r,
            p: params.p,
        }
    }
}

impl From<ScryptSettings> for ScryptParams {
    fn from(settings: ScryptSettings) -> Self {
        ScryptParams {
            log_n: settings.log_n,
            r: settings.r,
            p: settings.p,
        }
    }
}

/// Where and how the secret store is persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub format: StoreFormat,

    /// Local store file (the replica when a remote is configured)
    pub store_path: PathBuf,

    /// Sync server address; `None` keeps the store local
    #[serde(default)]
    pub remote_url: Option<String>,

    #[serde(default)]
    pub scrypt: ScryptSettings,

    /// RSA modulus size for the signing identity
    #[serde(default = "default_key_bits")]
    pub key_bits: usize,
}

fn default_key_bits() -> usize {
    KEY_BITS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            format: StoreFormat::default(),
            store_path: Self::default_store_path(),
            remote_url: None,
            scrypt: ScryptSettings::default(),
            key_bits: KEY_BITS,
        }
    }
}

impl StoreConfig {
    /// Local-only configuration of the given format
    pub fn local(format: StoreFormat, store_path: impl Into<PathBuf>) -> Self {
        Self {
            format,
            store_path: store_path.into(),
            ..Self::default()
        }
    }

    pub fn default_store_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("latchkey")
            .join("store")
    }

    pub fn validate(&self) -> Result<()> {
        // Stores written with a cost the decoder refuses could never be reopened
        ScryptParams::from(self.scrypt)
            .check_cost()
            .map_err(|e| Error::Config(e.to_string()))?;
        if self.format == StoreFormat::Legacy && self.remote_url.is_some() {
            return Err(Error::Config(
                "legacy stores cannot be synchronized remotely".to_string(),
            ));
        }
        Ok(())
    }

    /// Assemble the full pipeline for this configuration
    ///
    /// The result accepts and returns [`Payload::Document`](crate::Payload)
    /// values. Nothing is read or written here.
    pub fn build_pipeline(&self, password: &str) -> Result<Box<dyn StorageNode>> {
        self.validate()?;
        debug!(
            "Building {} pipeline for {:?} (remote: {:?})",
            self.format, self.store_path, self.remote_url
        );
        let params = ScryptParams::from(self.scrypt);
        let file = FileProvider::new(&self.store_path);

        let builder = match self.format {
            StoreFormat::Legacy => PipelineBuilder::on(file).then(ScryptEnvelope::new(password, params))?,
            StoreFormat::Derived => {
                let keys = match &self.remote_url {
                    Some(url) => KeySlot::with_identity(SigningIdentity::derive(
                        url,
                        password,
                        self.key_bits,
                    )?),
                    None => KeySlot::new(),
                };
                self.persistence(file, &keys)?
                    .then(ScryptAesCipher::new(password, params))?
            }
            StoreFormat::Bundled => {
                let keys = KeySlot::new();
                self.persistence(file, &keys)?
                    .then(ScryptAesCipher::new(password, params))?
                    .then(KeyExchange::new(keys, self.key_bits))?
            }
        };

        Ok(builder
            .then(GzipCodec::default())?
            .then(Utf8Codec)?
            .then(JsonCodec)?
            .build())
    }

    /// The byte-level leaf: a replica when a remote is configured, else the file
    fn persistence(&self, file: FileProvider, keys: &KeySlot) -> Result<PipelineBuilder> {
        match &self.remote_url {
            Some(url) => {
                let remote = RemoteProvider::new(url.clone(), keys.clone());
                let replica = Replica::new(Box::new(remote), Box::new(file))?;
                Ok(PipelineBuilder::on(replica))
            }
            None => Ok(PipelineBuilder::on(file)),
        }
    }
}
