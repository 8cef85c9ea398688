//! IPC client implementation

use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::DaemonConfig;
use crate::error::{DaemonError, Result};
use crate::lifecycle::{is_alive, read_pid};

use super::transport::{Connector, SocketConnector};
use super::framing::{recv_message, send_message, FrameOrder};
use super::types::{IpcRequest, IpcResponse};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How to start a daemon when none is running
#[derive(Debug, Clone)]
pub struct SpawnSettings {
    /// Daemon executable
    pub binary: PathBuf,
    /// Passed as `--config` when set
    pub config_path: Option<PathBuf>,
    /// Receives the daemon's stderr
    pub log_path: PathBuf,
    /// Give up waiting for the socket after this long
    pub timeout: Duration,
}

impl SpawnSettings {
    /// Settings from a daemon configuration, defaulting the binary to
    /// `latchkeyd` next to the current executable
    pub fn from_config(config: &DaemonConfig, config_path: Option<PathBuf>) -> Result<Self> {
        let binary = match &config.daemon_binary {
            Some(binary) => binary.clone(),
            None => sibling_binary("latchkeyd")?,
        };
        Ok(Self {
            binary,
            config_path,
            log_path: config.log_path.clone(),
            timeout: config.spawn_timeout(),
        })
    }
}

fn sibling_binary(name: &str) -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe
        .parent()
        .ok_or_else(|| DaemonError::Config(format!("{:?} has no parent directory", exe)))?;
    Ok(dir.join(name))
}

/// IPC client for CLI use
///
/// Holds one connection, opened on first use and reused for every request.
/// Requests are serialized; each is exactly one frame out and one frame back.
pub struct IpcClient {
    socket_path: PathBuf,
    pid_path: Option<PathBuf>,
    frame_order: FrameOrder,
    spawn: Option<SpawnSettings>,
    connection: Mutex<Option<UnixStream>>,
}

impl IpcClient {
    /// Client for an already running daemon; never spawns one
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            pid_path: None,
            frame_order: FrameOrder::default(),
            spawn: None,
            connection: Mutex::new(None),
        }
    }

    /// Client that can start the configured daemon on demand
    pub fn from_config(config: &DaemonConfig, config_path: Option<PathBuf>) -> Result<Self> {
        Ok(Self {
            socket_path: config.socket_path.clone(),
            pid_path: Some(config.pid_path.clone()),
            frame_order: config.frame_order,
            spawn: Some(SpawnSettings::from_config(config, config_path)?),
            connection: Mutex::new(None),
        })
    }

    pub fn with_frame_order(mut self, order: FrameOrder) -> Self {
        self.frame_order = order;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Marker names a live process, the socket exists, and it answers a ping
    pub async fn is_running(&self) -> bool {
        if self.pid_path.is_some() && !self.marker_held() {
            return false;
        }
        self.socket_path.exists() && self.ping().await
    }

    /// The PID marker names a live process
    fn marker_held(&self) -> bool {
        self.pid_path
            .as_deref()
            .and_then(read_pid)
            .is_some_and(is_alive)
    }

    /// Start the daemon unless it is already serving
    ///
    /// While the marker holder is alive but not answering (still starting,
    /// or draining after a stop) its socket is left alone and the client
    /// waits: for it to answer, or for it to exit so a new one can start.
    pub async fn ensure_running(&self) -> Result<()> {
        if self.is_running().await {
            return Ok(());
        }
        let spawn = self.spawn.as_ref().ok_or(DaemonError::NotRunning)?;
        self.disconnect().await;

        let deadline = Instant::now() + spawn.timeout;
        let mut spawned = false;
        loop {
            if !spawned && !self.marker_held() {
                self.remove_stale_socket()?;
                self.spawn_daemon(spawn)?;
                spawned = true;
            }
            if self.socket_path.exists() && (spawned || self.ping().await) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DaemonError::SpawnTimeout(spawn.timeout.as_millis() as u64));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn remove_stale_socket(&self) -> Result<()> {
        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => {
                debug!("Removed stale socket {:?}", self.socket_path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn spawn_daemon(&self, spawn: &SpawnSettings) -> Result<()> {
        if let Some(parent) = spawn.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spawn.log_path)?;

        let mut command = Command::new(&spawn.binary);
        if let Some(config_path) = &spawn.config_path {
            command.arg("--config").arg(config_path);
        }
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(log)
            .process_group(0)
            .spawn()
            .map_err(|e| DaemonError::Ipc(format!("Failed to spawn {:?}: {}", spawn.binary, e)))?;

        info!("Spawned daemon {:?} as pid {}", spawn.binary, child.id());
        // Reap the child once it exits
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }

    /// Send a request and get a response
    pub async fn request(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let mut connection = self.connection.lock().await;
        if connection.is_none() {
            *connection = Some(SocketConnector::connect(&self.socket_path).await?);
        }
        let stream = connection
            .as_mut()
            .ok_or_else(|| DaemonError::Ipc("Not connected".to_string()))?;

        let result = round_trip(stream, self.frame_order, request).await;
        if result.is_err() {
            // Unknown stream position; the next request reconnects
            *connection = None;
        }
        result
    }

    /// Like [`request`](Self::request), turning error responses into
    /// [`DaemonError::Remote`]
    pub async fn call(&self, request: &IpcRequest) -> Result<IpcResponse> {
        match self.request(request).await? {
            IpcResponse::Error { message } => Err(DaemonError::Remote(message)),
            response => Ok(response),
        }
    }

    /// Check if daemon is running
    pub async fn ping(&self) -> bool {
        matches!(
            self.request(&IpcRequest::Ping).await,
            Ok(IpcResponse::Pong { .. })
        )
    }

    /// Drop the held connection
    pub async fn disconnect(&self) {
        *self.connection.lock().await = None;
    }
}

async fn round_trip(
    stream: &mut UnixStream,
    order: FrameOrder,
    request: &IpcRequest,
) -> Result<IpcResponse> {
    send_message(stream, order, request).await?;
    recv_message(stream, order)
        .await?
        .ok_or_else(|| DaemonError::Ipc("Daemon closed the connection".to_string()))
}
