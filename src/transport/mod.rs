//! Transport collaborator boundary
//!
//! The session core never talks to a remote host directly. Every outbound request
//! goes through the [`Transport`] trait, and every inbound event arrives on the
//! [`EventSender`](crate::event_bus::EventSender) handed to the implementation.

pub mod loopback;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::session::SessionId;

pub use loopback::LoopbackTransport;

/// Default SSH port used when host parameters omit one
pub const DEFAULT_PORT: u16 = 22;

/// Authentication method for a new session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuthMethod {
    Password {
        password: String,
    },
    #[serde(rename_all = "camelCase")]
    PrivateKey {
        private_key_path: String,
        passphrase: Option<String>,
    },
    Agent,
}

/// Parameters for opening a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostParams {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub username: String,
    pub auth: AuthMethod,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl HostParams {
    pub fn new(host: impl Into<String>, username: impl Into<String>, auth: AuthMethod) -> Self {
        Self {
            host: host.into(),
            port: None,
            username: username.into(),
            auth,
            display_name: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// `host:port` with the default port filled in
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port.unwrap_or(DEFAULT_PORT))
    }

    /// Name shown to the user, falling back to `user@host`
    pub fn label(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| format!("{}@{}", self.username, self.host))
    }
}

/// Direction of a file transfer relative to the local machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferDirection {
    Upload,
    Download,
}

/// Outbound transfer request
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub direction: TransferDirection,
    pub remote_path: String,
    pub local_path: String,
}

/// Kind of a remote directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// A remote directory entry as reported by a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub permissions: u32,
}

impl DirectoryEntry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            size,
            permissions: 0o644,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
            size: 0,
            permissions: 0o755,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Remote file mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOp {
    Mkdir { path: String },
    Delete { path: String },
    Rename { from: String, to: String },
    Chmod { path: String, mode: u32 },
}

impl FileOp {
    pub fn name(&self) -> &'static str {
        match self {
            FileOp::Mkdir { .. } => "mkdir",
            FileOp::Delete { .. } => "delete",
            FileOp::Rename { .. } => "rename",
            FileOp::Chmod { .. } => "chmod",
        }
    }
}

/// Failures reported by the transport collaborator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Request rejected: {0}")]
    Rejected(String),
    #[error("Session closed: {0}")]
    Closed(SessionId),
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// Outbound operations implemented by the transport collaborator
///
/// Futures resolve when the remote side has answered. Long-running work
/// (transfers) reports progress through the event bus while the future is pending.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn create_session(&self, params: &HostParams) -> Result<SessionId, TransportError>;

    async fn close_session(&self, session_id: &SessionId) -> Result<(), TransportError>;

    async fn send_input(&self, session_id: &SessionId, data: &[u8]) -> Result<(), TransportError>;

    async fn request_resize(
        &self,
        session_id: &SessionId,
        cols: u16,
        rows: u16,
        stamp: u64,
    ) -> Result<(), TransportError>;

    async fn start_transfer(
        &self,
        session_id: &SessionId,
        request: &TransferRequest,
    ) -> Result<(), TransportError>;

    async fn list_directory(
        &self,
        session_id: &SessionId,
        path: &str,
    ) -> Result<Vec<DirectoryEntry>, TransportError>;

    async fn mutate_file(&self, session_id: &SessionId, op: &FileOp) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_params_fill_default_port() {
        let params = HostParams::new("example.org", "deploy", AuthMethod::Agent);
        assert_eq!(params.address(), "example.org:22");
        assert_eq!(params.label(), "deploy@example.org");

        let params = params.with_port(2222).with_display_name("staging");
        assert_eq!(params.address(), "example.org:2222");
        assert_eq!(params.label(), "staging");
    }

    #[test]
    fn host_params_use_camel_case() {
        let json = r#"{
            "host": "10.0.0.5",
            "username": "root",
            "auth": { "type": "privateKey", "privateKeyPath": "~/.ssh/id_ed25519", "passphrase": null }
        }"#;
        let params: HostParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.port, None);
        assert_eq!(
            params.auth,
            AuthMethod::PrivateKey {
                private_key_path: "~/.ssh/id_ed25519".to_string(),
                passphrase: None,
            }
        );
    }
}
