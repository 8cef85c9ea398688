//! Typed client for the Latchkey daemon

use std::path::PathBuf;

use latchkey_daemon::{DaemonConfig, DaemonError, IpcClient, IpcRequest, IpcResponse};

/// Error type for client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Daemon not running")]
    DaemonNotRunning,

    /// The daemon answered with an error; carries its message only
    #[error("{0}")]
    Remote(String),

    /// Bad interactive input
    #[error("{0}")]
    Input(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Daemon error: {0}")]
    Daemon(DaemonError),

    #[error(transparent)]
    Core(#[from] latchkey_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<DaemonError> for ClientError {
    fn from(e: DaemonError) -> Self {
        match e {
            DaemonError::Remote(message) => ClientError::Remote(message),
            DaemonError::NotRunning => ClientError::DaemonNotRunning,
            other => ClientError::Daemon(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

fn unexpected(response: IpcResponse) -> ClientError {
    ClientError::UnexpectedResponse(format!("{:?}", response))
}

/// Client for the Latchkey daemon, one method per operation
pub struct VaultClient {
    inner: IpcClient,
}

impl VaultClient {
    /// Client that starts the configured daemon when needed
    pub fn from_config(config: &DaemonConfig, config_path: Option<PathBuf>) -> Result<Self> {
        Ok(Self {
            inner: IpcClient::from_config(config, config_path)?,
        })
    }

    /// Client for a daemon already listening on `socket_path`
    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            inner: IpcClient::new(socket_path),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.is_running().await
    }

    pub async fn ensure_running(&self) -> Result<()> {
        Ok(self.inner.ensure_running().await?)
    }

    /// Daemon version
    pub async fn ping(&self) -> Result<String> {
        match self.inner.call(&IpcRequest::Ping).await? {
            IpcResponse::Pong { version } => Ok(version),
            other => Err(unexpected(other)),
        }
    }

    pub async fn is_logged_in(&self) -> Result<bool> {
        match self.inner.call(&IpcRequest::IsLoggedIn).await? {
            IpcResponse::LoggedIn { logged_in } => Ok(logged_in),
            other => Err(unexpected(other)),
        }
    }

    pub async fn log_in(&self, password: &str) -> Result<()> {
        self.expect_ok(IpcRequest::LogIn {
            password: password.to_string(),
        })
        .await
    }

    pub async fn list_password_names(&self) -> Result<Vec<String>> {
        match self.inner.call(&IpcRequest::ListPasswordNames).await? {
            IpcResponse::PasswordNames { names } => Ok(names),
            other => Err(unexpected(other)),
        }
    }

    /// Store a secret; the daemon saves before answering
    pub async fn add_password(&self, name: &str, password: &str) -> Result<()> {
        self.expect_ok(IpcRequest::AddPassword {
            name: name.to_string(),
            password: password.to_string(),
        })
        .await
    }

    pub async fn get_password(&self, name: &str) -> Result<String> {
        match self
            .inner
            .call(&IpcRequest::GetPassword {
                name: name.to_string(),
            })
            .await?
        {
            IpcResponse::Password { password } => Ok(password),
            other => Err(unexpected(other)),
        }
    }

    pub async fn stop_server(&self) -> Result<()> {
        self.expect_ok(IpcRequest::StopServer).await?;
        self.inner.disconnect().await;
        Ok(())
    }

    async fn expect_ok(&self, request: IpcRequest) -> Result<()> {
        match self.inner.call(&request).await? {
            IpcResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_keeps_message_only() {
        let err = ClientError::from(DaemonError::Remote("Not logged in".to_string()));
        assert!(matches!(&err, ClientError::Remote(m) if m == "Not logged in"));
        assert_eq!(err.to_string(), "Not logged in");
    }

    #[test]
    fn test_connect_failure_means_not_running() {
        let err = ClientError::from(DaemonError::NotRunning);
        assert!(matches!(err, ClientError::DaemonNotRunning));

        // Other IPC failures stay daemon errors, whatever their text says
        let err = ClientError::from(DaemonError::Ipc("peer not running tls".to_string()));
        assert!(matches!(err, ClientError::Daemon(DaemonError::Ipc(_))));
    }

    #[tokio::test]
    async fn test_absent_socket() {
        let dir = tempfile::tempdir().unwrap();
        let client = VaultClient::with_socket_path(dir.path().join("none.sock"));
        assert!(!client.is_running().await);
        assert!(matches!(
            client.ping().await,
            Err(ClientError::DaemonNotRunning)
        ));
    }
}
