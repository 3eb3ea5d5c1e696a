//! Process-wide backend event bus
//!
//! The transport collaborator pushes every backend event into a single upstream
//! [`EventSender`]. Consumers call [`EventBus::subscribe`] to get their own typed
//! channel. The pump task forwarding upstream events is started on the first
//! subscription and stops when the bus is disposed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::Result;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::session::SessionId;

/// Payload carried by a backend event
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Terminal output bytes
    Output(Vec<u8>),
    /// File transfer progress, `path` is the remote-side path
    TransferProgress {
        path: String,
        transferred: u64,
        total: u64,
    },
    /// Acknowledgement of a resize request
    ResizeAck { cols: u16, rows: u16, stamp: u64 },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Output(_) => "output",
            EventKind::TransferProgress { .. } => "transfer_progress",
            EventKind::ResizeAck { .. } => "resize_ack",
        }
    }
}

/// Tagged envelope delivered to every subscriber
#[derive(Debug, Clone, PartialEq)]
pub struct BackendEvent {
    pub session_id: SessionId,
    pub kind: EventKind,
}

impl BackendEvent {
    pub fn output(session_id: SessionId, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            session_id,
            kind: EventKind::Output(bytes.into()),
        }
    }

    pub fn progress(
        session_id: SessionId,
        path: impl Into<String>,
        transferred: u64,
        total: u64,
    ) -> Self {
        Self {
            session_id,
            kind: EventKind::TransferProgress {
                path: path.into(),
                transferred,
                total,
            },
        }
    }

    pub fn resize_ack(session_id: SessionId, cols: u16, rows: u16, stamp: u64) -> Self {
        Self {
            session_id,
            kind: EventKind::ResizeAck { cols, rows, stamp },
        }
    }
}

/// Upstream handle given to the transport collaborator
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<BackendEvent>,
}

impl EventSender {
    /// Publish an event, waiting for capacity
    pub async fn publish(&self, event: BackendEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|e| anyhow::anyhow!("Event bus closed: {}", e))
    }

    /// Publish without waiting; fails when the bus is full or closed
    pub fn try_publish(&self, event: BackendEvent) -> Result<()> {
        self.tx
            .try_send(event)
            .map_err(|e| anyhow::anyhow!("Failed to publish event: {}", e))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

enum Control {
    Register(u64, mpsc::UnboundedSender<BackendEvent>),
    Unregister(u64),
}

/// A consumer's view of the bus
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<BackendEvent>,
    control_tx: mpsc::UnboundedSender<Control>,
    disposed: bool,
}

impl Subscription {
    /// Wait for the next event; `None` once the bus is disposed
    pub async fn recv(&mut self) -> Option<BackendEvent> {
        if self.disposed {
            return None;
        }
        self.rx.recv().await
    }

    /// Stop receiving events; safe to call more than once
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        // The pump may already be gone during teardown.
        let _ = self.control_tx.send(Control::Unregister(self.id));
        self.rx.close();
        debug!("Subscription {} disposed", self.id);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Owned event bus service
pub struct EventBus {
    upstream_rx: Option<mpsc::Receiver<BackendEvent>>,
    control_tx: mpsc::UnboundedSender<Control>,
    control_rx: Option<mpsc::UnboundedReceiver<Control>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    pump: Option<JoinHandle<()>>,
    next_subscriber: AtomicU64,
    delivered: Arc<AtomicU64>,
    disposed: AtomicBool,
}

impl EventBus {
    /// Create the bus and the single upstream sender
    pub fn new(capacity: usize) -> (Self, EventSender) {
        let (tx, upstream_rx) = mpsc::channel(capacity.max(1));
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let bus = Self {
            upstream_rx: Some(upstream_rx),
            control_tx,
            control_rx: Some(control_rx),
            shutdown_tx: None,
            pump: None,
            next_subscriber: AtomicU64::new(1),
            delivered: Arc::new(AtomicU64::new(0)),
            disposed: AtomicBool::new(false),
        };

        (bus, EventSender { tx })
    }

    /// Register a consumer channel, starting the pump on first use
    pub fn subscribe(&mut self) -> Subscription {
        let id = self.next_subscriber.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();

        if self.disposed.load(Ordering::SeqCst) {
            warn!("Subscribe called on a disposed event bus");
            drop(tx);
        } else {
            let _ = self.control_tx.send(Control::Register(id, tx));
            self.ensure_pump();
        }

        Subscription {
            id,
            rx,
            control_tx: self.control_tx.clone(),
            disposed: false,
        }
    }

    fn ensure_pump(&mut self) {
        if self.pump.is_some() {
            return;
        }
        let (Some(upstream_rx), Some(control_rx)) =
            (self.upstream_rx.take(), self.control_rx.take())
        else {
            return;
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let delivered = self.delivered.clone();
        self.pump = Some(tokio::spawn(run_pump(
            upstream_rx,
            control_rx,
            shutdown_rx,
            delivered,
        )));
        info!("Event bus pump started");
    }

    /// Number of envelopes taken from upstream so far
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Tear down the upstream subscription; idempotent
    pub fn dispose(&mut self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        // Never-started bus: close upstream so publishers see a closed channel.
        if let Some(mut upstream_rx) = self.upstream_rx.take() {
            upstream_rx.close();
        }
        info!("Event bus disposed");
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.dispose();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

async fn run_pump(
    mut upstream_rx: mpsc::Receiver<BackendEvent>,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
    mut shutdown_rx: oneshot::Receiver<()>,
    delivered: Arc<AtomicU64>,
) {
    let mut subscribers: Vec<(u64, mpsc::UnboundedSender<BackendEvent>)> = Vec::new();

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => {
                debug!("Event bus pump received shutdown");
                break;
            }

            // Registrations are handled before events so a fresh subscriber
            // sees everything published after it subscribed.
            Some(control) = control_rx.recv() => {
                match control {
                    Control::Register(id, tx) => subscribers.push((id, tx)),
                    Control::Unregister(id) => subscribers.retain(|(sid, _)| *sid != id),
                }
            }

            event = upstream_rx.recv() => {
                let Some(event) = event else {
                    debug!("Event bus upstream closed");
                    break;
                };
                delivered.fetch_add(1, Ordering::Relaxed);
                subscribers.retain(|(id, tx)| {
                    let alive = tx.send(event.clone()).is_ok();
                    if !alive {
                        debug!("Dropping closed subscriber {}", id);
                    }
                    alive
                });
            }
        }
    }

    upstream_rx.close();
    info!("Event bus pump terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn sid(s: &str) -> SessionId {
        SessionId::new(s)
    }

    #[tokio::test]
    async fn fans_out_to_every_subscriber_in_order() {
        let (mut bus, sender) = EventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        sender.publish(BackendEvent::output(sid("a"), "one")).await.unwrap();
        sender.publish(BackendEvent::output(sid("a"), "two")).await.unwrap();

        for sub in [&mut first, &mut second] {
            let one = timeout(Duration::from_secs(1), sub.recv()).await.unwrap();
            let two = timeout(Duration::from_secs(1), sub.recv()).await.unwrap();
            assert_eq!(one, Some(BackendEvent::output(sid("a"), "one")));
            assert_eq!(two, Some(BackendEvent::output(sid("a"), "two")));
        }
        assert_eq!(bus.delivered(), 2);
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let (mut bus, sender) = EventBus::new(4);
        let mut sub = bus.subscribe();

        bus.dispose();
        bus.dispose();
        sub.dispose();
        sub.dispose();

        assert!(bus.is_disposed());
        assert!(sub.is_disposed());
        assert_eq!(sub.recv().await, None);

        // Publishing after teardown fails quietly once the pump has exited.
        let result = timeout(Duration::from_secs(1), async {
            loop {
                if sender.is_closed() {
                    break;
                }
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn dropped_subscription_does_not_block_others() {
        let (mut bus, sender) = EventBus::new(4);
        let dropped = bus.subscribe();
        let mut kept = bus.subscribe();
        drop(dropped);

        sender
            .publish(BackendEvent::resize_ack(sid("s"), 80, 24, 1))
            .await
            .unwrap();

        let event = timeout(Duration::from_secs(1), kept.recv()).await.unwrap();
        assert_eq!(event, Some(BackendEvent::resize_ack(sid("s"), 80, 24, 1)));
    }

    #[tokio::test]
    async fn dispose_without_subscribers_closes_upstream() {
        let (mut bus, sender) = EventBus::new(4);
        bus.dispose();
        assert!(sender.is_closed());
        assert!(sender.try_publish(BackendEvent::output(sid("x"), "late")).is_err());
    }
}
