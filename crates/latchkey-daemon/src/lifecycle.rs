//! Daemon lifecycle: single-instance PID marker and the serve loop
//!
//! ```text
//! NOT_RUNNING -> STARTING -> LISTENING <-> HANDLING
//!                   |            |
//!                   |            +-> IDLE_TIMEOUT | EXPLICIT_STOP | SIGNAL -> TERMINATED
//!                   +-> (another live daemon holds the marker) -> exit 0
//! ```

use latchkey_core::Session;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::DaemonConfig;
use crate::error::Result;
use crate::ipc::IpcServer;
use crate::state::DaemonState;
use crate::watchdog::run_watchdog;

/// Outcome of [`PidMarker::claim`]
#[derive(Debug)]
pub enum Claim {
    /// This process now owns the marker
    Acquired(PidMarker),
    /// Another live process holds it
    Held(u32),
}

/// File containing the PID of the running daemon
#[derive(Debug)]
pub struct PidMarker {
    path: PathBuf,
    pid: u32,
}

impl PidMarker {
    /// Write our PID to a private temp file, then take the marker unless a
    /// different live process already holds it
    pub fn claim(path: &Path) -> Result<Claim> {
        let pid = std::process::id();
        let temp = temp_path(path, pid);
        std::fs::write(&temp, pid.to_string())?;

        if let Some(existing) = read_pid(path) {
            if existing != pid && is_alive(existing) {
                std::fs::remove_file(&temp)?;
                return Ok(Claim::Held(existing));
            }
        }

        std::fs::rename(&temp, path)?;
        Ok(Claim::Acquired(Self {
            path: path.to_path_buf(),
            pid,
        }))
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the marker if it still names this process
    pub fn release(self) -> Result<()> {
        if read_pid(&self.path) == Some(self.pid) {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

fn temp_path(path: &Path, pid: u32) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", pid));
    path.with_file_name(name)
}

/// PID recorded in a marker file, if it exists and parses
pub fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Whether a process with this PID exists
pub fn is_alive(pid: u32) -> bool {
    // kill(0, ..) and negative PIDs address process groups
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs the permission and existence checks only
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// A configured daemon, ready to run
pub struct Daemon {
    config: DaemonConfig,
    state: Arc<DaemonState>,
}

impl Daemon {
    pub fn new(config: DaemonConfig) -> Self {
        let session = Session::new(config.store.clone());
        Self {
            config,
            state: Arc::new(DaemonState::new(session)),
        }
    }

    pub fn state(&self) -> Arc<DaemonState> {
        Arc::clone(&self.state)
    }

    /// Claim the marker, serve until shutdown, then clean up
    ///
    /// Returns `Ok(false)` without serving when another daemon is running.
    pub async fn run(self) -> Result<bool> {
        self.config.ensure_directories()?;

        let marker = match PidMarker::claim(&self.config.pid_path)? {
            Claim::Acquired(marker) => marker,
            Claim::Held(pid) => {
                info!("Daemon already running as pid {}", pid);
                return Ok(false);
            }
        };
        info!("Claimed {:?} as pid {}", marker.path(), marker.pid());

        let watchdog = tokio::spawn(run_watchdog(
            Arc::clone(&self.state),
            self.config.idle_timeout(),
        ));

        let server = IpcServer::new(
            self.config.socket_path.clone(),
            self.config.frame_order,
            Arc::clone(&self.state),
        );
        let served = server.run().await;

        watchdog.abort();
        if let Err(e) = marker.release() {
            warn!("Failed to remove PID marker: {}", e);
        }
        served?;
        info!("Daemon terminated");
        Ok(true)
    }
}
