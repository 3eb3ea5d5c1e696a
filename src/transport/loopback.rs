//! In-process transport used by the demo and the tests
//!
//! Echoes terminal input back as output, acknowledges resizes, simulates transfers
//! with chunked progress events and serves an in-memory remote file tree.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use super::{
    DirectoryEntry, EntryKind, FileOp, HostParams, Transport, TransferDirection, TransferRequest,
    TransportError,
};
use crate::event_bus::{BackendEvent, EventSender};
use crate::navigator::path;
use crate::session::SessionId;

const DEFAULT_CHUNK_SIZE: u64 = 64 * 1024;

#[derive(Debug, Clone)]
struct Node {
    kind: EntryKind,
    size: u64,
    mode: u32,
}

/// Remote file tree keyed by absolute path
#[derive(Debug, Clone)]
struct RemoteTree {
    nodes: BTreeMap<String, Node>,
}

impl RemoteTree {
    fn seeded(username: &str) -> Self {
        let mut tree = Self {
            nodes: BTreeMap::new(),
        };
        let home = format!("/home/{}", username);
        for dir in ["/", "/etc", "/home", "/tmp", "/var", "/var/www", "/var/www/html"] {
            tree.insert_dir(dir);
        }
        tree.insert_dir(&home);
        tree.insert_file("/etc/hosts", 158);
        tree.insert_file("/var/www/html/index.html", 612);
        tree.insert_file(&format!("{}/report.pdf", home.trim_end_matches('/')), 1000);
        tree.insert_file(&format!("{}/notes.txt", home.trim_end_matches('/')), 42);
        tree
    }

    fn insert_dir(&mut self, at: &str) {
        self.nodes.insert(
            at.to_string(),
            Node {
                kind: EntryKind::Directory,
                size: 0,
                mode: 0o755,
            },
        );
    }

    fn insert_file(&mut self, at: &str, size: u64) {
        self.nodes.insert(
            at.to_string(),
            Node {
                kind: EntryKind::File,
                size,
                mode: 0o644,
            },
        );
    }

    fn is_dir(&self, at: &str) -> bool {
        matches!(self.nodes.get(at), Some(node) if node.kind == EntryKind::Directory)
    }

    fn list(&self, dir: &str) -> Result<Vec<DirectoryEntry>, TransportError> {
        if !self.is_dir(dir) {
            return Err(TransportError::NotFound(dir.to_string()));
        }
        let entries = self
            .nodes
            .iter()
            .filter(|(p, _)| p.as_str() != path::ROOT && path::parent(p) == dir)
            .map(|(p, node)| DirectoryEntry {
                name: path::file_name(p).to_string(),
                kind: node.kind,
                size: node.size,
                permissions: node.mode,
            })
            .collect();
        Ok(entries)
    }

    fn apply(&mut self, op: &FileOp) -> Result<(), TransportError> {
        match op {
            FileOp::Mkdir { path: at } => {
                if self.nodes.contains_key(at) {
                    return Err(TransportError::Rejected(format!("{} already exists", at)));
                }
                if !self.is_dir(&path::parent(at)) {
                    return Err(TransportError::NotFound(path::parent(at)));
                }
                self.insert_dir(at);
            }
            FileOp::Delete { path: at } => {
                if at == path::ROOT {
                    return Err(TransportError::PermissionDenied(at.clone()));
                }
                if self.nodes.remove(at).is_none() {
                    return Err(TransportError::NotFound(at.clone()));
                }
                let prefix = format!("{}/", at);
                self.nodes.retain(|p, _| !p.starts_with(&prefix));
            }
            FileOp::Rename { from, to } => {
                if !self.nodes.contains_key(from) {
                    return Err(TransportError::NotFound(from.clone()));
                }
                if self.nodes.contains_key(to) {
                    return Err(TransportError::Rejected(format!("{} already exists", to)));
                }
                let prefix = format!("{}/", from);
                let moved: Vec<(String, Node)> = self
                    .nodes
                    .iter()
                    .filter(|(p, _)| p.as_str() == from.as_str() || p.starts_with(&prefix))
                    .map(|(p, n)| (p.clone(), n.clone()))
                    .collect();
                for (old, node) in moved {
                    self.nodes.remove(&old);
                    let renamed = format!("{}{}", to, &old[from.len()..]);
                    self.nodes.insert(renamed, node);
                }
            }
            FileOp::Chmod { path: at, mode } => match self.nodes.get_mut(at) {
                Some(node) => node.mode = *mode & 0o7777,
                None => return Err(TransportError::NotFound(at.clone())),
            },
        }
        Ok(())
    }
}

#[derive(Default)]
struct LoopbackState {
    sessions: HashMap<SessionId, RemoteTree>,
    refused_hosts: HashSet<String>,
    fail_close: bool,
    hold_transfers: bool,
}

/// Loopback transport collaborator
#[derive(Clone)]
pub struct LoopbackTransport {
    events: EventSender,
    state: Arc<Mutex<LoopbackState>>,
    release: Arc<Notify>,
    chunk_size: u64,
    report_bare_names: bool,
}

impl LoopbackTransport {
    /// Create a loopback transport publishing into `events`
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            state: Arc::new(Mutex::new(LoopbackState::default())),
            release: Arc::new(Notify::new()),
            chunk_size: DEFAULT_CHUNK_SIZE,
            report_bare_names: false,
        }
    }

    /// Size of each simulated transfer chunk
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Report only the file name in progress events instead of the full remote path
    pub fn with_bare_progress_names(mut self, enabled: bool) -> Self {
        self.report_bare_names = enabled;
        self
    }

    /// Make `create_session` fail for `host`
    pub async fn refuse_host(&self, host: impl Into<String>) {
        self.state.lock().await.refused_hosts.insert(host.into());
    }

    /// Make `close_session` report failure (the session is still torn down)
    pub async fn fail_close(&self, enabled: bool) {
        self.state.lock().await.fail_close = enabled;
    }

    /// Keep transfers pending after their first progress event until released
    pub async fn hold_transfers(&self, enabled: bool) {
        self.state.lock().await.hold_transfers = enabled;
        if !enabled {
            self.release.notify_waiters();
        }
    }

    /// Let held transfers run to completion
    pub fn release_transfers(&self) {
        self.release.notify_waiters();
    }

    pub async fn open_sessions(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    async fn ensure_open(&self, session_id: &SessionId) -> Result<(), TransportError> {
        if self.state.lock().await.sessions.contains_key(session_id) {
            Ok(())
        } else {
            Err(TransportError::Closed(session_id.clone()))
        }
    }

    async fn publish(&self, event: BackendEvent) -> Result<(), TransportError> {
        self.events
            .publish(event)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn transfer_size(
        &self,
        session_id: &SessionId,
        request: &TransferRequest,
    ) -> Result<u64, TransportError> {
        match request.direction {
            TransferDirection::Download => {
                let state = self.state.lock().await;
                let tree = state
                    .sessions
                    .get(session_id)
                    .ok_or_else(|| TransportError::Closed(session_id.clone()))?;
                match tree.nodes.get(&request.remote_path) {
                    Some(node) if node.kind == EntryKind::File => Ok(node.size),
                    _ => Err(TransportError::NotFound(request.remote_path.clone())),
                }
            }
            TransferDirection::Upload => {
                let metadata = tokio::fs::metadata(&request.local_path)
                    .await
                    .map_err(|_| TransportError::NotFound(request.local_path.clone()))?;
                Ok(metadata.len())
            }
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn create_session(&self, params: &HostParams) -> Result<SessionId, TransportError> {
        let mut state = self.state.lock().await;
        if params.host.trim().is_empty() || state.refused_hosts.contains(&params.host) {
            return Err(TransportError::ConnectionFailed(params.address()));
        }

        let session_id = SessionId::generate();
        state
            .sessions
            .insert(session_id.clone(), RemoteTree::seeded(&params.username));
        info!("Loopback session {} opened for {}", session_id, params.address());
        Ok(session_id)
    }

    async fn close_session(&self, session_id: &SessionId) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        let existed = state.sessions.remove(session_id).is_some();
        if state.fail_close {
            return Err(TransportError::Io(format!(
                "close request for {} timed out",
                session_id
            )));
        }
        if existed {
            debug!("Loopback session {} closed", session_id);
            Ok(())
        } else {
            Err(TransportError::Closed(session_id.clone()))
        }
    }

    async fn send_input(&self, session_id: &SessionId, data: &[u8]) -> Result<(), TransportError> {
        self.ensure_open(session_id).await?;
        self.publish(BackendEvent::output(session_id.clone(), data.to_vec()))
            .await
    }

    async fn request_resize(
        &self,
        session_id: &SessionId,
        cols: u16,
        rows: u16,
        stamp: u64,
    ) -> Result<(), TransportError> {
        self.ensure_open(session_id).await?;
        self.publish(BackendEvent::resize_ack(session_id.clone(), cols, rows, stamp))
            .await
    }

    async fn start_transfer(
        &self,
        session_id: &SessionId,
        request: &TransferRequest,
    ) -> Result<(), TransportError> {
        let total = self.transfer_size(session_id, request).await?;
        let reported_path = if self.report_bare_names {
            path::file_name(&request.remote_path).to_string()
        } else {
            request.remote_path.clone()
        };

        let mut transferred = 0u64;
        let mut first = true;
        loop {
            transferred = (transferred + self.chunk_size).min(total);
            self.publish(BackendEvent::progress(
                session_id.clone(),
                reported_path.clone(),
                transferred,
                total,
            ))
            .await?;

            if first {
                first = false;
                // Register interest before checking the flag so a release
                // between the two cannot be missed.
                let released = self.release.notified();
                if self.state.lock().await.hold_transfers {
                    released.await;
                }
            }

            if transferred >= total {
                break;
            }
            tokio::task::yield_now().await;
        }

        if request.direction == TransferDirection::Upload {
            let mut state = self.state.lock().await;
            match state.sessions.get_mut(session_id) {
                Some(tree) => tree.insert_file(&request.remote_path, total),
                None => {
                    warn!("Upload finished after session {} closed", session_id);
                    return Err(TransportError::Closed(session_id.clone()));
                }
            }
        }

        debug!(
            "Loopback transfer of {} finished ({} bytes)",
            request.remote_path, total
        );
        Ok(())
    }

    async fn list_directory(
        &self,
        session_id: &SessionId,
        dir: &str,
    ) -> Result<Vec<DirectoryEntry>, TransportError> {
        let state = self.state.lock().await;
        let tree = state
            .sessions
            .get(session_id)
            .ok_or_else(|| TransportError::Closed(session_id.clone()))?;
        tree.list(dir)
    }

    async fn mutate_file(&self, session_id: &SessionId, op: &FileOp) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        let tree = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| TransportError::Closed(session_id.clone()))?;
        tree.apply(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::{EventBus, EventKind};
    use crate::transport::AuthMethod;

    fn params(host: &str) -> HostParams {
        HostParams::new(host, "u", AuthMethod::Agent)
    }

    #[tokio::test]
    async fn refused_host_fails_creation() {
        let (_bus, sender) = EventBus::new(16);
        let transport = LoopbackTransport::new(sender);
        transport.refuse_host("down.example").await;

        let err = transport.create_session(&params("down.example")).await;
        assert!(matches!(err, Err(TransportError::ConnectionFailed(_))));
        assert_eq!(transport.open_sessions().await, 0);
    }

    #[tokio::test]
    async fn lists_seeded_home_directory() {
        let (_bus, sender) = EventBus::new(16);
        let transport = LoopbackTransport::new(sender);
        let id = transport.create_session(&params("box")).await.unwrap();

        let entries = transport.list_directory(&id, "/home/u").await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["notes.txt", "report.pdf"]);

        let missing = transport.list_directory(&id, "/nope").await;
        assert!(matches!(missing, Err(TransportError::NotFound(_))));
    }

    #[tokio::test]
    async fn rename_moves_subtree() {
        let (_bus, sender) = EventBus::new(16);
        let transport = LoopbackTransport::new(sender);
        let id = transport.create_session(&params("box")).await.unwrap();

        transport
            .mutate_file(
                &id,
                &FileOp::Rename {
                    from: "/var/www".to_string(),
                    to: "/var/site".to_string(),
                },
            )
            .await
            .unwrap();

        let entries = transport.list_directory(&id, "/var/site/html").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "index.html");
    }

    #[tokio::test]
    async fn download_emits_chunked_progress() {
        let (mut bus, sender) = EventBus::new(64);
        let mut sub = bus.subscribe();
        let transport = LoopbackTransport::new(sender).with_chunk_size(400);
        let id = transport.create_session(&params("box")).await.unwrap();

        let request = TransferRequest {
            direction: TransferDirection::Download,
            remote_path: "/home/u/report.pdf".to_string(),
            local_path: "/tmp/report.pdf".to_string(),
        };
        transport.start_transfer(&id, &request).await.unwrap();

        let mut seen = Vec::new();
        while seen.len() < 3 {
            if let Some(BackendEvent {
                kind: EventKind::TransferProgress { transferred, .. },
                ..
            }) = sub.recv().await
            {
                seen.push(transferred);
            }
        }
        assert_eq!(seen, vec![400, 800, 1000]);
    }

    #[test]
    fn mkdir_and_chmod_update_listing() {
        tokio_test::block_on(async {
            let (_bus, sender) = EventBus::new(16);
            let transport = LoopbackTransport::new(sender);
            let id = transport.create_session(&params("box")).await.unwrap();

            transport
                .mutate_file(&id, &FileOp::Mkdir { path: "/tmp/build".to_string() })
                .await
                .unwrap();
            transport
                .mutate_file(
                    &id,
                    &FileOp::Chmod {
                        path: "/tmp/build".to_string(),
                        mode: 0o700,
                    },
                )
                .await
                .unwrap();

            let entries = transport.list_directory(&id, "/tmp").await.unwrap();
            assert_eq!(entries.len(), 1);
            assert!(entries[0].is_dir());
            assert_eq!(entries[0].permissions, 0o700);

            let again = transport
                .mutate_file(&id, &FileOp::Mkdir { path: "/tmp/build".to_string() })
                .await;
            assert!(matches!(again, Err(TransportError::Rejected(_))));
        });
    }
}
