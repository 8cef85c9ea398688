//! IPC server implementation

use latchkey_core::Session;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::state::DaemonState;
use crate::watchdog::ConnectionGuard;

use super::transport::{Listener, OwnerSocket};
use super::framing::{read_frame, send_message, FrameOrder};
use super::types::{IpcRequest, IpcResponse};

/// IPC server
pub struct IpcServer {
    /// Socket path
    socket_path: PathBuf,

    /// Length prefix byte order
    frame_order: FrameOrder,

    state: Arc<DaemonState>,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(socket_path: PathBuf, frame_order: FrameOrder, state: Arc<DaemonState>) -> Self {
        Self {
            socket_path,
            frame_order,
            state,
        }
    }

    /// Accept connections until shutdown, then drain them and remove the socket
    pub async fn run(&self) -> Result<()> {
        self.serve::<OwnerSocket>().await
    }

    async fn serve<L: Listener>(&self) -> Result<()> {
        let transport = L::bind(&self.socket_path).await?;

        info!("IPC server listening on {:?}", self.socket_path);

        let mut shutdown = self.state.subscribe_shutdown();
        while !self.state.is_shutting_down() {
            tokio::select! {
                _ = shutdown.changed() => {}
                accepted = transport.accept() => match accepted {
                    Ok(stream) => {
                        let guard = self.state.activity().connection_opened();
                        debug!(
                            "Accepted connection ({} open)",
                            self.state.activity().open_connections()
                        );
                        let state = Arc::clone(&self.state);
                        let order = self.frame_order;

                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, state, order, guard).await {
                                error!("Connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
        }

        info!(
            "Stopped accepting, draining {} connection(s)",
            self.state.activity().open_connections()
        );
        self.state.activity().wait_drained().await;
        transport.remove()?;
        info!("IPC server stopped");
        Ok(())
    }
}

/// Serve one connection until the peer closes it or the daemon shuts down
///
/// A request already being dispatched always completes and is answered.
async fn handle_connection<S>(
    stream: S,
    state: Arc<DaemonState>,
    order: FrameOrder,
    _guard: ConnectionGuard,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut shutdown = state.subscribe_shutdown();

    while !state.is_shutting_down() {
        let frame = tokio::select! {
            frame = read_frame(&mut reader, order) => frame?,
            _ = shutdown.changed() => break,
        };
        let Some(frame) = frame else {
            debug!("Peer closed connection");
            break;
        };

        let response = match IpcRequest::decode(&frame) {
            Ok(request) => {
                state.activity().touch();
                let response = dispatch(request, &state).await;
                state.activity().touch();
                response
            }
            Err(message) => {
                warn!("Rejected malformed or unknown request");
                IpcResponse::Error { message }
            }
        };

        send_message(&mut writer, order, &response).await?;
    }

    Ok(())
}

/// Handle a single request
async fn dispatch(request: IpcRequest, state: &Arc<DaemonState>) -> IpcResponse {
    let operation = request.operation();
    info!("Dispatching {}", operation);

    match request {
        IpcRequest::Ping => IpcResponse::Pong {
            version: env!("CARGO_PKG_VERSION").to_string(),
        },

        IpcRequest::StopServer => {
            info!("Stop requested by client");
            state.trigger_shutdown();
            IpcResponse::Ok
        }

        request => {
            // scrypt and blocking HTTP run off the async workers
            let session = state.session();
            let outcome = tokio::task::spawn_blocking(move || {
                let mut session = session.blocking_lock();
                apply(&mut session, request)
            })
            .await;

            match outcome {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    debug!("{} failed: {}", operation, e);
                    IpcResponse::Error {
                        message: e.to_string(),
                    }
                }
                Err(e) => {
                    error!("{} task failed: {}", operation, e);
                    IpcResponse::Error {
                        message: format!("Internal error during {}", operation),
                    }
                }
            }
        }
    }
}

/// Run a session operation; the caller holds the session lock throughout
fn apply(session: &mut Session, request: IpcRequest) -> latchkey_core::Result<IpcResponse> {
    let response = match request {
        IpcRequest::IsLoggedIn => IpcResponse::LoggedIn {
            logged_in: session.is_logged_in(),
        },
        IpcRequest::LogIn { password } => {
            session.log_in(&password, true)?;
            IpcResponse::Ok
        }
        IpcRequest::ListPasswordNames => IpcResponse::PasswordNames {
            names: session.list_password_names()?,
        },
        IpcRequest::AddPassword { name, password } => {
            session.add_password(&name, &password, true)?;
            IpcResponse::Ok
        }
        IpcRequest::GetPassword { name } => IpcResponse::Password {
            password: session.get_password(&name)?,
        },
        // Answered in `dispatch` without the session
        IpcRequest::Ping | IpcRequest::StopServer => IpcResponse::Ok,
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use latchkey_core::{ScryptSettings, StoreConfig, StoreFormat};
    use std::path::Path;

    fn session(path: &Path) -> Session {
        Session::new(StoreConfig {
            scrypt: ScryptSettings {
                log_n: 4,
                r: 8,
                p: 1,
            },
            ..StoreConfig::local(StoreFormat::Derived, path)
        })
    }

    #[test]
    fn test_apply_requires_login() {
        let mut session = session(Path::new("/nonexistent/store"));
        assert_eq!(
            apply(&mut session, IpcRequest::IsLoggedIn).unwrap(),
            IpcResponse::LoggedIn { logged_in: false }
        );
        assert!(apply(&mut session, IpcRequest::ListPasswordNames).is_err());
    }

    #[test]
    fn test_apply_add_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store");
        let mut session = session(&path);
        session.log_in("pw", false).unwrap();
        session.init_empty();

        let add = IpcRequest::AddPassword {
            name: "mail".to_string(),
            password: "x".to_string(),
        };
        assert_eq!(apply(&mut session, add).unwrap(), IpcResponse::Ok);
        assert!(path.exists());
        assert_eq!(
            apply(
                &mut session,
                IpcRequest::GetPassword {
                    name: "mail".to_string()
                }
            )
            .unwrap(),
            IpcResponse::Password {
                password: "x".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_stop_server_triggers_shutdown() {
        let state = Arc::new(DaemonState::new(session(Path::new("unused"))));
        assert_eq!(dispatch(IpcRequest::StopServer, &state).await, IpcResponse::Ok);
        assert!(state.is_shutting_down());
    }

    #[tokio::test]
    async fn test_session_errors_become_error_responses() {
        let state = Arc::new(DaemonState::new(session(Path::new("unused"))));
        let response = dispatch(
            IpcRequest::GetPassword {
                name: "x".to_string(),
            },
            &state,
        )
        .await;
        assert_eq!(
            response,
            IpcResponse::Error {
                message: "Not logged in".to_string()
            }
        );
    }
}
