//! IPC between the daemon and local clients
//!
//! Unix domain socket, owner-only, carrying length-prefixed JSON frames.

mod client;
mod framing;
mod server;
mod transport;
mod types;

// Public API
pub use client::{IpcClient, SpawnSettings};
pub use framing::{read_frame, recv_message, send_message, write_frame, FrameOrder, MAX_FRAME_LEN};
pub use server::IpcServer;
pub use transport::{Connector, Listener, OwnerSocket, SocketConnector};
pub use types::{IpcRequest, IpcResponse, Operation};
