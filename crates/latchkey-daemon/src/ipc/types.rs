//! IPC protocol types
//!
//! Requests are `{"op": <operation>, "args": {...}}`; responses are tagged
//! by `"type"`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed set of operations the daemon serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Ping,
    IsLoggedIn,
    LogIn,
    ListPasswordNames,
    AddPassword,
    GetPassword,
    StopServer,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Ping,
        Operation::IsLoggedIn,
        Operation::LogIn,
        Operation::ListPasswordNames,
        Operation::AddPassword,
        Operation::GetPassword,
        Operation::StopServer,
    ];

    /// Wire name
    pub fn name(self) -> &'static str {
        match self {
            Operation::Ping => "ping",
            Operation::IsLoggedIn => "is_logged_in",
            Operation::LogIn => "log_in",
            Operation::ListPasswordNames => "list_password_names",
            Operation::AddPassword => "add_password",
            Operation::GetPassword => "get_password",
            Operation::StopServer => "stop_server",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// IPC request types
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "snake_case")]
pub enum IpcRequest {
    /// Check if daemon is running
    Ping,

    IsLoggedIn,

    /// Unlock the store
    LogIn { password: String },

    ListPasswordNames,

    /// Insert or overwrite, then persist
    AddPassword { name: String, password: String },

    GetPassword { name: String },

    /// Finish in-flight work and exit
    StopServer,
}

impl IpcRequest {
    pub fn operation(&self) -> Operation {
        match self {
            IpcRequest::Ping => Operation::Ping,
            IpcRequest::IsLoggedIn => Operation::IsLoggedIn,
            IpcRequest::LogIn { .. } => Operation::LogIn,
            IpcRequest::ListPasswordNames => Operation::ListPasswordNames,
            IpcRequest::AddPassword { .. } => Operation::AddPassword,
            IpcRequest::GetPassword { .. } => Operation::GetPassword,
            IpcRequest::StopServer => Operation::StopServer,
        }
    }

    /// Decode a request frame, checking the operation tag first
    ///
    /// Unknown operations and malformed arguments yield a message suitable
    /// for an [`IpcResponse::Error`].
    pub fn decode(frame: &[u8]) -> Result<Self, String> {
        let value: serde_json::Value =
            serde_json::from_slice(frame).map_err(|e| format!("Invalid request: {}", e))?;
        let tag = value
            .get("op")
            .and_then(|op| op.as_str())
            .ok_or_else(|| "Invalid request: missing operation".to_string())?;
        let operation =
            Operation::from_name(tag).ok_or_else(|| format!("Unknown operation: {}", tag))?;
        serde_json::from_value(value)
            .map_err(|e| format!("Invalid arguments for {}: {}", operation, e))
    }
}

// Arguments carry secrets; only the operation is ever printed
impl fmt::Debug for IpcRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpcRequest")
            .field("op", &self.operation())
            .finish_non_exhaustive()
    }
}

/// IPC response types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcResponse {
    /// Success with no data
    Ok,

    /// Pong response
    Pong { version: String },

    LoggedIn { logged_in: bool },

    PasswordNames { names: Vec<String> },

    Password { password: String },

    /// Error response
    Error { message: String },
}
