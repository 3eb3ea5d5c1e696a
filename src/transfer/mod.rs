//! Transfer coordination
//!
//! At most one non-terminal [`TransferOperation`] exists per session. Progress
//! events are matched to the tracked operation by remote path; anything that does
//! not match is dropped rather than creating an implicit operation.

pub mod operation;

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};
use crate::session::{SessionId, SessionRegistry};

pub use crate::transport::TransferDirection;
pub use operation::{paths_match, TransferId, TransferOperation, TransferState};

/// Outcome of feeding one progress event to the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressOutcome {
    Applied,
    /// Session unaddressable, no operation, or operation already terminal
    NoTarget,
    /// Path did not match the tracked operation
    Unmatched,
}

/// Owns the transfer slot of every session
#[derive(Debug, Default)]
pub struct TransferCoordinator {
    operations: HashMap<SessionId, TransferOperation>,
    next_id: u64,
}

impl TransferCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin tracking a transfer; rejected while another one is in flight
    pub fn start(
        &mut self,
        session_id: &SessionId,
        direction: TransferDirection,
        remote_path: impl Into<String>,
        local_path: impl Into<String>,
        total_hint: Option<u64>,
    ) -> CoreResult<TransferId> {
        if let Some(existing) = self.operations.get(session_id) {
            if !existing.is_terminal() {
                return Err(CoreError::AlreadyInFlight(session_id.clone()));
            }
        }

        self.next_id += 1;
        let id = TransferId(self.next_id);
        let mut op = TransferOperation::new(
            id,
            session_id.clone(),
            direction,
            remote_path.into(),
            local_path.into(),
            total_hint,
        );
        op.state = TransferState::InProgress;
        info!(
            "Transfer {} started for session {}: {:?} {}",
            id, session_id, direction, op.remote_path
        );
        self.operations.insert(session_id.clone(), op);
        Ok(id)
    }

    /// Apply a progress event if it matches the session's tracked operation
    pub fn on_progress(
        &mut self,
        registry: &SessionRegistry,
        session_id: &SessionId,
        event_path: &str,
        transferred: u64,
        total: u64,
    ) -> ProgressOutcome {
        if !registry.is_addressable(session_id) {
            debug!("Dropping progress for unaddressable session {}", session_id);
            return ProgressOutcome::NoTarget;
        }
        let op = match self.operations.get_mut(session_id) {
            Some(op) if op.state == TransferState::InProgress => op,
            _ => {
                debug!("No transfer in progress for session {}", session_id);
                return ProgressOutcome::NoTarget;
            }
        };
        if !paths_match(&op.remote_path, event_path) {
            debug!(
                "Progress path {} does not match transfer {} ({})",
                event_path, op.id, op.remote_path
            );
            return ProgressOutcome::Unmatched;
        }

        op.transferred_bytes = op.transferred_bytes.max(transferred);
        if total > 0 && op.total_bytes == 0 {
            op.total_bytes = total;
        }
        ProgressOutcome::Applied
    }

    /// Finish the tracked operation; stale or unknown ids are ignored
    pub fn complete(
        &mut self,
        session_id: &SessionId,
        transfer_id: TransferId,
        success: bool,
        error: Option<String>,
    ) -> bool {
        let op = match self.operations.get_mut(session_id) {
            Some(op) if op.id == transfer_id && !op.is_terminal() => op,
            _ => {
                debug!(
                    "Ignoring stale completion of transfer {} for session {}",
                    transfer_id, session_id
                );
                return false;
            }
        };

        if success {
            if op.total_bytes > 0 {
                op.transferred_bytes = op.transferred_bytes.max(op.total_bytes);
            }
            op.finish(TransferState::Completed, None);
            info!("Transfer {} completed ({} bytes)", transfer_id, op.transferred_bytes);
        } else {
            warn!(
                "Transfer {} failed: {}",
                transfer_id,
                error.as_deref().unwrap_or("unknown error")
            );
            op.finish(TransferState::Failed, error);
        }
        true
    }

    /// Cancel the in-flight operation; returns whether a transition happened
    pub fn cancel(&mut self, session_id: &SessionId) -> bool {
        match self.operations.get_mut(session_id) {
            Some(op) if op.state == TransferState::InProgress => {
                op.finish(TransferState::Cancelled, None);
                info!("Transfer {} cancelled", op.id);
                true
            }
            _ => false,
        }
    }

    /// The session's latest operation, terminal or not
    pub fn current(&self, session_id: &SessionId) -> Option<&TransferOperation> {
        self.operations.get(session_id)
    }

    /// Forget the session's slot, returning the record as it stood
    pub fn release(&mut self, session_id: &SessionId) -> Option<TransferOperation> {
        self.operations.remove(session_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.operations.values().filter(|op| !op.is_terminal()).count()
    }
}
