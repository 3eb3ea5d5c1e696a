//! End-to-end routing tests against the loopback transport

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use terminoda::config::Config;
use terminoda::error::CoreError;
use terminoda::event_bus::{BackendEvent, EventBus, EventSender};
use terminoda::session::{Lifecycle, SessionEvent, SessionId, SessionManager};
use terminoda::transfer::{TransferDirection, TransferState};
use terminoda::transport::{
    AuthMethod, DirectoryEntry, FileOp, HostParams, LoopbackTransport, TransferRequest, Transport,
    TransportError,
};
use tokio::time::timeout;

struct Harness {
    manager: SessionManager,
    transport: LoopbackTransport,
    sender: EventSender,
}

fn harness_with(configure: impl FnOnce(LoopbackTransport) -> LoopbackTransport) -> Harness {
    let (bus, sender) = EventBus::new(256);
    let transport = configure(LoopbackTransport::new(sender.clone()));
    let manager = SessionManager::new(Config::default(), bus, Arc::new(transport.clone()));
    Harness {
        manager,
        transport,
        sender,
    }
}

fn harness() -> Harness {
    harness_with(|transport| transport)
}

fn params(host: &str) -> HostParams {
    HostParams::new(host, "u", AuthMethod::Agent)
}

/// Drain events until nothing arrives for a short while
async fn settle(manager: &mut SessionManager) {
    while let Ok(true) = timeout(Duration::from_millis(50), manager.step()).await {}
}

/// Step the manager until `done` holds, failing after two seconds
async fn step_until(manager: &mut SessionManager, done: impl Fn(&SessionManager) -> bool) {
    let result = timeout(Duration::from_secs(2), async {
        while !done(manager) {
            if !manager.step().await {
                break;
            }
        }
    })
    .await;
    assert!(result.is_ok(), "condition not reached in time");
    assert!(done(manager), "event bus closed before condition was reached");
}

fn progress(manager: &SessionManager, id: &SessionId) -> Option<(u64, u64, TransferState)> {
    manager
        .transfers()
        .current(id)
        .map(|op| (op.transferred_bytes, op.total_bytes, op.state))
}

#[tokio::test]
async fn interleaved_output_stays_in_its_session() {
    let mut h = harness();
    let s1 = h.manager.create(params("alpha")).await.unwrap();
    let s2 = h.manager.create(params("beta")).await.unwrap();

    for (id, chunk) in [(&s2, "wor"), (&s1, "hel"), (&s1, "lo"), (&s2, "ld")] {
        h.sender
            .publish(BackendEvent::output(id.clone(), chunk.as_bytes()))
            .await
            .unwrap();
    }
    settle(&mut h.manager).await;

    assert_eq!(h.manager.outputs().snapshot(&s1).unwrap(), b"hello".to_vec());
    assert_eq!(h.manager.outputs().snapshot(&s2).unwrap(), b"world".to_vec());
    assert_eq!(h.manager.stats().events_routed, 4);
}

#[tokio::test]
async fn echoed_input_lands_in_the_writing_session() {
    let mut h = harness();
    let s1 = h.manager.create(params("alpha")).await.unwrap();
    let s2 = h.manager.create(params("beta")).await.unwrap();

    h.manager.write(&s1, b"ls -la\n").await.unwrap();
    settle(&mut h.manager).await;

    let text = h.manager.outputs().rendered_text(&s1).unwrap();
    assert!(text.contains("ls -la"));
    assert_eq!(h.manager.outputs().snapshot(&s2).unwrap(), Vec::<u8>::new());
}

#[tokio::test]
async fn second_transfer_conflicts_until_first_finishes() {
    let mut h = harness_with(|transport| transport.with_chunk_size(500));
    let s1 = h.manager.create(params("alpha")).await.unwrap();
    h.transport.hold_transfers(true).await;

    h.manager
        .start_transfer(
            &s1,
            TransferDirection::Download,
            "/home/u/report.pdf",
            "/tmp/report.pdf",
            None,
        )
        .unwrap();
    step_until(&mut h.manager, |m| {
        progress(m, &s1).map(|(done, _, _)| done) == Some(500)
    })
    .await;
    assert_eq!(progress(&h.manager, &s1), Some((500, 1000, TransferState::InProgress)));

    let err = h
        .manager
        .start_transfer(&s1, TransferDirection::Download, "/etc/hosts", "/tmp/hosts", None)
        .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyInFlight(_)));
    assert!(err.is_conflict());

    h.transport.hold_transfers(false).await;
    step_until(&mut h.manager, |m| {
        progress(m, &s1).map(|(_, _, state)| state) == Some(TransferState::Completed)
    })
    .await;
    assert_eq!(progress(&h.manager, &s1), Some((1000, 1000, TransferState::Completed)));

    h.manager
        .start_transfer(&s1, TransferDirection::Download, "/etc/hosts", "/tmp/hosts", None)
        .unwrap();
}

#[tokio::test]
async fn bare_file_name_progress_matches_tracked_path() {
    let mut h = harness_with(|transport| transport.with_chunk_size(400).with_bare_progress_names(true));
    let s1 = h.manager.create(params("alpha")).await.unwrap();
    h.transport.hold_transfers(true).await;

    h.manager
        .start_transfer(
            &s1,
            TransferDirection::Download,
            "/home/u/report.pdf",
            "/tmp/report.pdf",
            None,
        )
        .unwrap();
    step_until(&mut h.manager, |m| {
        progress(m, &s1).map(|(done, _, _)| done) == Some(400)
    })
    .await;
    assert_eq!(h.manager.stats().unmatched_progress, 0);

    h.sender
        .publish(BackendEvent::progress(s1.clone(), "other.pdf", 900, 1000))
        .await
        .unwrap();
    settle(&mut h.manager).await;
    assert_eq!(progress(&h.manager, &s1).map(|(done, _, _)| done), Some(400));
    assert_eq!(h.manager.stats().unmatched_progress, 1);

    h.transport.hold_transfers(false).await;
}

#[tokio::test]
async fn close_during_transfer_drops_late_progress() {
    let mut h = harness_with(|transport| transport.with_chunk_size(250));
    let mut ui = h.manager.take_event_receiver().unwrap();
    let s1 = h.manager.create(params("alpha")).await.unwrap();
    h.transport.hold_transfers(true).await;

    let transfer_id = h
        .manager
        .start_transfer(
            &s1,
            TransferDirection::Download,
            "/home/u/report.pdf",
            "/tmp/report.pdf",
            None,
        )
        .unwrap();
    step_until(&mut h.manager, |m| progress(m, &s1).is_some_and(|(done, _, _)| done > 0)).await;

    assert!(h.manager.close(&s1).await);
    let dropped_before = h.manager.stats().events_dropped;

    h.sender
        .publish(BackendEvent::progress(s1.clone(), "/home/u/report.pdf", 750, 1000))
        .await
        .unwrap();
    h.transport.hold_transfers(false).await;
    settle(&mut h.manager).await;

    assert!(h.manager.transfers().current(&s1).is_none());
    assert!(h.manager.stats().events_dropped > dropped_before);
    assert_eq!(h.manager.registry().lifecycle(&s1), Some(Lifecycle::Closed));
    assert!(!h.manager.registry().is_addressable(&s1));

    let mut last_transfer = None;
    while let Ok(event) = ui.try_recv() {
        if let SessionEvent::SessionClosed {
            session_id,
            last_transfer: op,
        } = event
        {
            assert_eq!(session_id, s1);
            last_transfer = op;
        }
    }
    let op = last_transfer.expect("close reports the tracked transfer");
    assert_eq!(op.id, transfer_id);
    assert_eq!(op.state, TransferState::InProgress);
}

#[tokio::test]
async fn progress_never_moves_backwards() {
    let mut h = harness_with(|transport| transport.with_chunk_size(50));
    let s1 = h.manager.create(params("alpha")).await.unwrap();
    h.transport.hold_transfers(true).await;

    h.manager
        .start_transfer(&s1, TransferDirection::Download, "/etc/hosts", "/tmp/hosts", None)
        .unwrap();
    for transferred in [100, 60, 150, 120] {
        h.sender
            .publish(BackendEvent::progress(s1.clone(), "/etc/hosts", transferred, 158))
            .await
            .unwrap();
    }
    settle(&mut h.manager).await;

    let (done, total, _) = progress(&h.manager, &s1).unwrap();
    assert_eq!(total, 158);
    assert_eq!(done, 150);
    h.transport.hold_transfers(false).await;
}

/// Delegates to the loopback transport but never acknowledges resizes
struct SilentResize(LoopbackTransport);

#[async_trait]
impl Transport for SilentResize {
    async fn create_session(&self, params: &HostParams) -> Result<SessionId, TransportError> {
        self.0.create_session(params).await
    }

    async fn close_session(&self, session_id: &SessionId) -> Result<(), TransportError> {
        self.0.close_session(session_id).await
    }

    async fn send_input(&self, session_id: &SessionId, data: &[u8]) -> Result<(), TransportError> {
        self.0.send_input(session_id, data).await
    }

    async fn request_resize(
        &self,
        _session_id: &SessionId,
        _cols: u16,
        _rows: u16,
        _stamp: u64,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn start_transfer(
        &self,
        session_id: &SessionId,
        request: &TransferRequest,
    ) -> Result<(), TransportError> {
        self.0.start_transfer(session_id, request).await
    }

    async fn list_directory(
        &self,
        session_id: &SessionId,
        path: &str,
    ) -> Result<Vec<DirectoryEntry>, TransportError> {
        self.0.list_directory(session_id, path).await
    }

    async fn mutate_file(&self, session_id: &SessionId, op: &FileOp) -> Result<(), TransportError> {
        self.0.mutate_file(session_id, op).await
    }
}

#[tokio::test]
async fn out_of_order_acks_keep_the_latest_request() {
    let (bus, sender) = EventBus::new(64);
    let transport = SilentResize(LoopbackTransport::new(sender.clone()));
    let mut manager = SessionManager::new(Config::default(), bus, Arc::new(transport));
    let s1 = manager.create(params("alpha")).await.unwrap();

    let first = manager.request_resize(&s1, 100, 30).await.unwrap();
    let second = manager.request_resize(&s1, 132, 43).await.unwrap();
    assert!(first < second);

    sender
        .publish(BackendEvent::resize_ack(s1.clone(), 132, 43, second))
        .await
        .unwrap();
    sender
        .publish(BackendEvent::resize_ack(s1.clone(), 100, 30, first))
        .await
        .unwrap();
    settle(&mut manager).await;

    assert_eq!(manager.resize_negotiator().geometry(&s1), Some((132, 43)));
    let state = manager.resize_negotiator().state(&s1).unwrap();
    assert_eq!(state.acknowledged_stamp, Some(second));
    assert_eq!(manager.stats().stale_acks, 1);
}

#[tokio::test]
async fn closed_session_ignores_every_event_kind() {
    let mut h = harness();
    let s1 = h.manager.create(params("alpha")).await.unwrap();
    settle(&mut h.manager).await;
    h.manager.close(&s1).await;

    h.sender
        .publish(BackendEvent::output(s1.clone(), b"late".to_vec()))
        .await
        .unwrap();
    h.sender
        .publish(BackendEvent::progress(s1.clone(), "/etc/hosts", 1, 2))
        .await
        .unwrap();
    h.sender
        .publish(BackendEvent::resize_ack(s1.clone(), 10, 10, 99))
        .await
        .unwrap();
    settle(&mut h.manager).await;

    assert!(h.manager.outputs().snapshot(&s1).is_none());
    assert!(h.manager.transfers().current(&s1).is_none());
    assert!(h.manager.resize_negotiator().geometry(&s1).is_none());
    assert_eq!(h.manager.stats().events_dropped, 3);
    assert!(matches!(
        h.manager.write(&s1, b"x").await,
        Err(CoreError::Unaddressable(_))
    ));
    assert!(!h.manager.close(&s1).await);
}

#[tokio::test]
async fn refused_host_registers_nothing() {
    let mut h = harness();
    h.transport.refuse_host("down").await;

    let err = h.manager.create(params("down")).await.unwrap_err();
    assert!(matches!(err, CoreError::Transport(TransportError::ConnectionFailed(_))));
    assert_eq!(h.manager.registry().active_count(), 0);
    assert!(h.manager.outputs().is_empty());
}

#[tokio::test]
async fn failed_transport_close_still_tombstones() {
    let mut h = harness();
    let s1 = h.manager.create(params("alpha")).await.unwrap();
    h.transport.fail_close(true).await;

    assert!(h.manager.close(&s1).await);
    assert!(h.manager.registry().is_tombstoned(&s1));
    assert!(h.manager.outputs().snapshot(&s1).is_none());
    assert_eq!(h.transport.open_sessions().await, 0);
}

#[tokio::test]
async fn browsing_and_mutation_refresh_the_listing() {
    let mut h = harness();
    let s1 = h.manager.create(params("alpha")).await.unwrap();
    settle(&mut h.manager).await;

    h.manager.navigate_into(&s1, "home").unwrap();
    h.manager.navigate_into(&s1, "u").unwrap();
    settle(&mut h.manager).await;
    let view = h.manager.navigator().view(&s1).unwrap();
    assert_eq!(view.current_path, "/home/u");
    assert_eq!(view.entries.len(), 2);

    h.manager
        .mutate_file(&s1, FileOp::Mkdir { path: "projects".into() })
        .await
        .unwrap();
    settle(&mut h.manager).await;
    let view = h.manager.navigator().view(&s1).unwrap();
    assert!(view.entries.iter().any(|e| e.name == "projects" && e.is_dir()));

    assert!(h.manager.go_up(&s1).unwrap());
    settle(&mut h.manager).await;
    assert_eq!(h.manager.navigator().current_path(&s1), Some("/home"));

    h.manager.navigate_to(&s1, "/nowhere").unwrap();
    settle(&mut h.manager).await;
    let view = h.manager.navigator().view(&s1).unwrap();
    assert_eq!(view.current_path, "/nowhere");
    assert!(view.error.is_some());
}

#[tokio::test]
async fn shutdown_disposes_the_bus() {
    let mut h = harness();
    h.manager.create(params("alpha")).await.unwrap();
    h.manager.create(params("beta")).await.unwrap();
    settle(&mut h.manager).await;

    h.manager.shutdown().await.unwrap();
    assert!(h.manager.event_bus().is_disposed());
    assert_eq!(h.manager.registry().active_count(), 0);
    assert!(!h.manager.step().await);

    let closed = timeout(Duration::from_secs(1), async {
        while !h.sender.is_closed() {
            tokio::task::yield_now().await;
        }
    })
    .await;
    assert!(closed.is_ok(), "upstream sender should observe the disposed bus");
}
