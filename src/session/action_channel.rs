//! Action Channel for asynchronous event processing

use anyhow::{Result, anyhow};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::metrics::MultiplexerStats;
use crate::navigator::DirectoryView;
use crate::output::MatchLocation;
use crate::transfer::TransferOperation;

use super::types::{Session, SessionId};

/// Session events for communication between components
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Shutdown request
    ShutdownRequested,
    /// Error event
    Error { message: String },
    /// A session became active
    SessionOpened { session: Session },
    /// A session was closed; carries the transfer record it still held
    SessionClosed {
        session_id: SessionId,
        last_transfer: Option<TransferOperation>,
    },
    /// Active sessions, oldest first
    SessionList {
        sessions: Vec<Session>,
        focused: Option<SessionId>,
    },
    /// Focus moved to another session
    FocusChanged { session_id: SessionId },
    /// Output was appended to a session buffer
    OutputAppended { session_id: SessionId, bytes: Vec<u8> },
    /// Transfer record changed
    TransferUpdated { operation: TransferOperation },
    /// Displayed geometry changed
    GeometryChanged {
        session_id: SessionId,
        cols: u16,
        rows: u16,
        acknowledged: bool,
    },
    /// Directory listing arrived
    DirectoryLoaded { view: DirectoryView },
    /// Directory listing failed
    DirectoryError {
        session_id: SessionId,
        path: String,
        message: String,
    },
    /// Remote file mutation succeeded
    FileOpCompleted { session_id: SessionId, description: String },
    /// Search highlight moved or was cleared
    SearchResult {
        session_id: SessionId,
        query: String,
        location: Option<MatchLocation>,
        line_text: Option<String>,
    },
    /// Status information
    StatusInfo { info: StatusInfo },
    /// Configuration information
    ConfigInfo { config: Config },
    /// Configuration reset
    ConfigReset,
    /// Help text
    HelpInfo { lines: Vec<String> },
}

/// Status information for session
#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub version: String,
    pub state: String,
    pub active_sessions: usize,
    pub sessions: Vec<String>,
    pub closed_sessions: usize,
    pub transfers_in_flight: usize,
    pub events_delivered: u64,
    pub stats: MultiplexerStats,
}

/// Action channel for event processing
///
/// The underlying channel only exists once a consumer has taken the receiver.
/// Events sent before that, or after the receiver is dropped, are discarded.
#[derive(Default)]
pub struct ActionChannel {
    /// Event sender, present once the receiver has been handed out
    event_tx: Option<mpsc::UnboundedSender<SessionEvent>>,
    taken: bool,
}

impl ActionChannel {
    /// Create a new ActionChannel with no consumer attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Send event to channel
    pub fn send_event(&self, event: SessionEvent) -> Result<()> {
        let Some(event_tx) = &self.event_tx else {
            return Err(anyhow!("No event receiver attached"));
        };
        event_tx
            .send(event)
            .map_err(|e| anyhow!("Failed to send event: {}", e))
    }

    /// Hand out the event receiver; `None` if already taken
    pub fn event_rx(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        if self.taken {
            return None;
        }
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        self.event_tx = Some(event_tx);
        self.taken = true;
        Some(event_rx)
    }

    /// Whether a live consumer holds the receiver
    pub fn is_attached(&self) -> bool {
        self.event_tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_events_in_order() {
        let mut channel = ActionChannel::new();
        let mut rx = channel.event_rx().unwrap();
        channel
            .send_event(SessionEvent::Error {
                message: "first".to_string(),
            })
            .unwrap();
        channel.send_event(SessionEvent::ShutdownRequested).unwrap();

        match rx.recv().await {
            Some(SessionEvent::Error { message }) => assert_eq!(message, "first"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(rx.recv().await, Some(SessionEvent::ShutdownRequested)));
    }

    #[test]
    fn events_before_the_receiver_is_taken_are_discarded() {
        let mut channel = ActionChannel::new();
        assert!(!channel.is_attached());
        assert!(channel.send_event(SessionEvent::ShutdownRequested).is_err());

        let mut rx = channel.event_rx().unwrap();
        assert!(channel.is_attached());
        assert!(rx.try_recv().is_err());
        assert!(channel.event_rx().is_none());

        drop(rx);
        assert!(!channel.is_attached());
        assert!(channel.send_event(SessionEvent::ConfigReset).is_err());
    }
}
