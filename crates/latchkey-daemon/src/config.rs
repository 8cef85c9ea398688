//! Daemon configuration

use latchkey_core::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{DaemonError, Result};
use crate::ipc::FrameOrder;

/// Environment variable overriding the configuration file location
pub const CONFIG_ENV: &str = "LATCHKEY_CONFIG";

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Unix socket path for IPC
    pub socket_path: PathBuf,

    /// PID marker claimed by the running daemon
    pub pid_path: PathBuf,

    /// Log file for the spawned daemon
    pub log_path: PathBuf,

    /// Shut down after this many seconds without activity
    pub idle_timeout_secs: u64,

    /// Byte order of frame length prefixes
    pub frame_order: FrameOrder,

    /// Daemon executable to spawn; defaults to `latchkeyd` next to the client
    pub daemon_binary: Option<PathBuf>,

    /// How long a client waits for a freshly spawned daemon (milliseconds)
    pub spawn_timeout_ms: u64,

    /// Secret store served by the daemon
    pub store: StoreConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let runtime = Self::default_runtime_dir();
        Self {
            socket_path: runtime.join("latchkey.sock"),
            pid_path: runtime.join("latchkeyd.pid"),
            log_path: runtime.join("latchkeyd.log"),
            idle_timeout_secs: 300,
            frame_order: FrameOrder::default(),
            daemon_binary: None,
            spawn_timeout_ms: 5000,
            store: StoreConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Runtime files with every path under `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            socket_path: dir.join("latchkey.sock"),
            pid_path: dir.join("latchkeyd.pid"),
            log_path: dir.join("latchkeyd.log"),
            store: StoreConfig {
                store_path: dir.join("store"),
                ..StoreConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn spawn_timeout(&self) -> Duration {
        Duration::from_millis(self.spawn_timeout_ms)
    }

    /// Directory holding the socket, PID marker and log
    fn default_runtime_dir() -> PathBuf {
        dirs::runtime_dir()
            .map(|dir| dir.join("latchkey"))
            .unwrap_or_else(|| {
                // SAFETY: getuid has no preconditions and cannot fail
                let uid = unsafe { libc::getuid() };
                PathBuf::from(format!("/tmp/latchkey-{}", uid))
            })
    }

    /// `$LATCHKEY_CONFIG`, else the XDG config location
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("latchkey")
            .join("config.json")
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| DaemonError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load `path`, writing the defaults there first when it is missing
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let config = Self::default();
        config.save(path)?;
        info!("Created default config at {:?}", path);
        Ok(config)
    }

    /// Create runtime directories; the socket directory is owner-only
    pub fn ensure_directories(&self) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
            std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))?;
        }
        for path in [&self.pid_path, &self.log_path, &self.store.store_path] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let created = DaemonConfig::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(DaemonConfig::load(&path).unwrap(), created);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "idle_timeout_secs": 7, "frame_order": "little" }"#).unwrap();

        let config = DaemonConfig::load(&path).unwrap();
        assert_eq!(config.idle_timeout(), Duration::from_secs(7));
        assert_eq!(config.frame_order, FrameOrder::Little);
        assert_eq!(config.spawn_timeout_ms, 5000);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(DaemonConfig::load(&path), Err(DaemonError::Config(_))));
    }

    #[test]
    fn test_default_runtime_files_share_a_directory() {
        let config = DaemonConfig::default();
        let runtime = config.socket_path.parent().unwrap().to_path_buf();
        assert_eq!(config.pid_path.parent().unwrap(), runtime);
        assert_eq!(config.log_path.parent().unwrap(), runtime);
        match dirs::runtime_dir() {
            Some(dir) => assert_eq!(runtime, dir.join("latchkey")),
            None => assert!(runtime.starts_with("/tmp")),
        }
    }

    #[test]
    fn test_runtime_dir_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig::in_dir(&dir.path().join("run"));
        config.ensure_directories().unwrap();

        let mode = std::fs::metadata(dir.path().join("run")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
