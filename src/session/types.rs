//! Session identity and lifecycle types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque session token assigned by the transport collaborator
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an identifier handed out by the transport
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Session lifecycle, `Closed` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Lifecycle {
    Connecting,
    Active,
    Closing,
    Closed,
}

impl Lifecycle {
    /// Whether the lifecycle may move to `next`
    pub fn can_transition_to(self, next: Lifecycle) -> bool {
        use Lifecycle::*;
        matches!(
            (self, next),
            (Connecting, Active) | (Connecting, Closing) | (Active, Closing) | (Closing, Closed)
        )
    }
}

/// A live or tombstoned session record
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub display_name: String,
    pub host_address: String,
    pub lifecycle: Lifecycle,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Session {
    /// A fresh record in `Connecting`
    pub fn new(id: SessionId, display_name: impl Into<String>, host_address: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            host_address: host_address.into(),
            lifecycle: Lifecycle::Connecting,
            created_at: chrono::Utc::now(),
        }
    }
}
