//! Socket transport: an owner-only Unix listener and its connector

use async_trait::async_trait;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use crate::error::{DaemonError, Result};

/// Where the server takes connections from
#[async_trait]
pub trait Listener: Send + Sync + Sized {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Listen at `path`, replacing whatever stale file is there
    async fn bind(path: &Path) -> Result<Self>;

    /// Next connection from an authorized peer
    async fn accept(&self) -> Result<Self::Stream>;

    fn path(&self) -> &Path;

    /// Remove the socket file so clients see the daemon as gone
    fn remove(&self) -> Result<()> {
        match std::fs::remove_file(self.path()) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// How clients reach a [`Listener`]
#[async_trait]
pub trait Connector {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    async fn connect(path: &Path) -> Result<Self::Stream>;
}

/// Unix socket readable and writable only by the daemon's user
///
/// Besides the 0600 file mode, every accepted peer's credentials are
/// checked against our effective uid.
pub struct OwnerSocket {
    listener: UnixListener,
    path: PathBuf,
    uid: libc::uid_t,
}

#[async_trait]
impl Listener for OwnerSocket {
    type Stream = UnixStream;

    async fn bind(path: &Path) -> Result<Self> {
        if path.exists() {
            debug!("Replacing stale socket {:?}", path);
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)
            .map_err(|e| DaemonError::Ipc(format!("Failed to bind {:?}: {}", path, e)))?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;

        Ok(Self {
            listener,
            path: path.to_path_buf(),
            // SAFETY: geteuid has no preconditions and cannot fail
            uid: unsafe { libc::geteuid() },
        })
    }

    async fn accept(&self) -> Result<UnixStream> {
        loop {
            let (stream, _) = self
                .listener
                .accept()
                .await
                .map_err(|e| DaemonError::Ipc(format!("Accept failed: {}", e)))?;
            match stream.peer_cred() {
                Ok(cred) if cred.uid() == self.uid => return Ok(stream),
                Ok(cred) => warn!("Refused peer with uid {}", cred.uid()),
                Err(e) => warn!("Refused peer without credentials: {}", e),
            }
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Plain Unix socket connector
pub struct SocketConnector;

#[async_trait]
impl Connector for SocketConnector {
    type Stream = UnixStream;

    async fn connect(path: &Path) -> Result<UnixStream> {
        UnixStream::connect(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
                DaemonError::NotRunning
            }
            _ => DaemonError::Ipc(format!("Failed to connect to {:?}: {}", path, e)),
        })
    }
}
