//! Error types shared by the session core

use crate::session::SessionId;
use crate::transport::TransportError;

/// Errors returned synchronously to callers of the session core
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The session is unknown, closing or already closed
    #[error("Session {0} is not addressable")]
    Unaddressable(SessionId),
    /// A transfer is already in flight for the session
    #[error("A transfer is already in flight for session {0}")]
    AlreadyInFlight(SessionId),
    /// No transfer is tracked for the session
    #[error("No transfer tracked for session {0}")]
    NoTransfer(SessionId),
    /// The outbound request failed in the transport collaborator
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    /// A path argument could not be used
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl CoreError {
    /// Whether the error is a conflict the caller can resolve by waiting or cancelling
    pub fn is_conflict(&self) -> bool {
        matches!(self, CoreError::AlreadyInFlight(_))
    }
}

/// Result alias for session core operations
pub type CoreResult<T> = Result<T, CoreError>;
