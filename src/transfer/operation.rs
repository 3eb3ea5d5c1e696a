//! Transfer operation records

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::session::SessionId;
use crate::transport::TransferDirection;

/// Process-unique transfer identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TransferId(pub u64);

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// `Pending -> InProgress -> {Completed | Failed | Cancelled}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferState {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferState::Completed | TransferState::Failed | TransferState::Cancelled
        )
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransferState::Pending => "pending",
            TransferState::InProgress => "in progress",
            TransferState::Completed => "completed",
            TransferState::Failed => "failed",
            TransferState::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// One upload or download tracked for a session
#[derive(Debug, Clone, Serialize)]
pub struct TransferOperation {
    pub id: TransferId,
    pub session_id: SessionId,
    pub direction: TransferDirection,
    pub remote_path: String,
    pub local_path: String,
    pub transferred_bytes: u64,
    /// Zero until known
    pub total_bytes: u64,
    pub state: TransferState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TransferOperation {
    pub(crate) fn new(
        id: TransferId,
        session_id: SessionId,
        direction: TransferDirection,
        remote_path: String,
        local_path: String,
        total_hint: Option<u64>,
    ) -> Self {
        Self {
            id,
            session_id,
            direction,
            remote_path,
            local_path,
            transferred_bytes: 0,
            total_bytes: total_hint.unwrap_or(0),
            state: TransferState::Pending,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Completion ratio in `[0, 1]`, `None` while the total is unknown
    pub fn fraction(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            return None;
        }
        Some((self.transferred_bytes as f64 / self.total_bytes as f64).min(1.0))
    }

    pub(crate) fn finish(&mut self, state: TransferState, error: Option<String>) {
        self.state = state;
        self.error = error;
        self.finished_at = Some(Utc::now());
    }
}

/// Whether a progress event path refers to the tracked remote path
///
/// Exact equality first, then a suffix match in either direction after
/// normalising `\` to `/`.
pub fn paths_match(tracked: &str, reported: &str) -> bool {
    if tracked == reported {
        return true;
    }
    if tracked.is_empty() || reported.is_empty() {
        return false;
    }
    let tracked = tracked.replace('\\', "/");
    let reported = reported.replace('\\', "/");
    tracked.ends_with(&reported) || reported.ends_with(&tracked)
}
