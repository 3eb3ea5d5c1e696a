//! Remote directory browsing state
//!
//! Each session has one [`DirectoryView`]. Every path change issues a fresh
//! [`ListingTicket`]; outcomes carrying an older ticket are discarded so a slow
//! listing cannot overwrite a newer one.

pub mod path;

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::session::{SessionId, SessionRegistry};
use crate::transport::{DirectoryEntry, FileOp};

/// Identifies one listing request for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ListingTicket(pub u64);

/// A listing the caller must request from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRequest {
    pub ticket: ListingTicket,
    pub path: String,
}

/// Directory browser state for one session
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryView {
    pub session_id: SessionId,
    pub current_path: String,
    pub entries: Vec<DirectoryEntry>,
    pub is_loading: bool,
    pub error: Option<String>,
    #[serde(skip)]
    ticket: u64,
}

impl DirectoryView {
    fn new(session_id: SessionId, path: String) -> Self {
        Self {
            session_id,
            current_path: path,
            entries: Vec::new(),
            is_loading: false,
            error: None,
            ticket: 0,
        }
    }

    fn begin_listing(&mut self) -> ListingRequest {
        self.ticket += 1;
        self.is_loading = true;
        self.error = None;
        ListingRequest {
            ticket: ListingTicket(self.ticket),
            path: self.current_path.clone(),
        }
    }

    /// Entries sorted directories first, then by name
    pub fn sorted_entries(&self) -> Vec<&DirectoryEntry> {
        let mut entries: Vec<&DirectoryEntry> = self.entries.iter().collect();
        entries.sort_by(|a, b| b.is_dir().cmp(&a.is_dir()).then_with(|| a.name.cmp(&b.name)));
        entries
    }
}

#[derive(Debug, Default)]
pub struct DirectoryNavigator {
    views: HashMap<SessionId, DirectoryView>,
}

impl DirectoryNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the view and request its first listing
    pub fn open(&mut self, id: &SessionId, initial_path: Option<&str>) -> CoreResult<ListingRequest> {
        let start = path::normalize(initial_path.unwrap_or(path::ROOT))?;
        let view = self
            .views
            .entry(id.clone())
            .or_insert_with(|| DirectoryView::new(id.clone(), start));
        Ok(view.begin_listing())
    }

    pub fn release(&mut self, id: &SessionId) {
        self.views.remove(id);
    }

    /// Descend into a child entry of the current directory
    pub fn navigate_into(&mut self, id: &SessionId, entry: &str) -> CoreResult<ListingRequest> {
        let view = self
            .views
            .get_mut(id)
            .ok_or_else(|| CoreError::Unaddressable(id.clone()))?;
        view.current_path = path::join(&view.current_path, entry)?;
        Ok(view.begin_listing())
    }

    /// Go to the parent directory; `None` at the root or for unknown sessions
    pub fn go_up(&mut self, id: &SessionId) -> Option<ListingRequest> {
        let view = self.views.get_mut(id)?;
        if view.current_path == path::ROOT {
            return None;
        }
        view.current_path = path::parent(&view.current_path);
        Some(view.begin_listing())
    }

    /// Jump to a path, absolute or relative to the current directory
    pub fn navigate_to(&mut self, id: &SessionId, target: &str) -> CoreResult<ListingRequest> {
        let view = self
            .views
            .get_mut(id)
            .ok_or_else(|| CoreError::Unaddressable(id.clone()))?;
        view.current_path = path::resolve(&view.current_path, target)?;
        Ok(view.begin_listing())
    }

    /// Re-list the current directory
    pub fn refresh(&mut self, id: &SessionId) -> Option<ListingRequest> {
        self.views.get_mut(id).map(DirectoryView::begin_listing)
    }

    /// Apply a successful listing; returns false if it was superseded or dropped
    pub fn set_entries(
        &mut self,
        registry: &SessionRegistry,
        id: &SessionId,
        ticket: ListingTicket,
        entries: Vec<DirectoryEntry>,
    ) -> bool {
        let Some(view) = self.current_view(registry, id, ticket) else {
            return false;
        };
        view.entries = entries;
        view.error = None;
        view.is_loading = false;
        true
    }

    /// Apply a failed listing; the current path is kept
    pub fn set_error(
        &mut self,
        registry: &SessionRegistry,
        id: &SessionId,
        ticket: ListingTicket,
        message: impl Into<String>,
    ) -> bool {
        let Some(view) = self.current_view(registry, id, ticket) else {
            return false;
        };
        view.entries.clear();
        view.error = Some(message.into());
        view.is_loading = false;
        true
    }

    fn current_view(
        &mut self,
        registry: &SessionRegistry,
        id: &SessionId,
        ticket: ListingTicket,
    ) -> Option<&mut DirectoryView> {
        if !registry.is_addressable(id) {
            debug!("Dropping listing for unaddressable session {}", id);
            return None;
        }
        let view = self.views.get_mut(id)?;
        if ticket.0 != view.ticket {
            debug!(
                "Discarding superseded listing {:?} for session {} (latest {})",
                ticket, id, view.ticket
            );
            return None;
        }
        Some(view)
    }

    /// Rewrite the paths of a file operation against the current directory
    pub fn resolve_op(&self, id: &SessionId, op: &FileOp) -> CoreResult<FileOp> {
        let current = self.current_path(id).unwrap_or(path::ROOT);
        let resolve = |p: &str| path::resolve(current, p);
        Ok(match op {
            FileOp::Mkdir { path } => FileOp::Mkdir { path: resolve(path)? },
            FileOp::Delete { path } => FileOp::Delete { path: resolve(path)? },
            FileOp::Rename { from, to } => FileOp::Rename {
                from: resolve(from)?,
                to: resolve(to)?,
            },
            FileOp::Chmod { path, mode } => FileOp::Chmod {
                path: resolve(path)?,
                mode: *mode,
            },
        })
    }

    pub fn current_path(&self, id: &SessionId) -> Option<&str> {
        self.views.get(id).map(|v| v.current_path.as_str())
    }

    pub fn view(&self, id: &SessionId) -> Option<&DirectoryView> {
        self.views.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (SessionRegistry, DirectoryNavigator, SessionId) {
        let mut registry = SessionRegistry::new();
        let id = SessionId::new("s1");
        registry.register(id.clone(), "s1", "host:22").unwrap();
        registry.activate(&id);
        let mut navigator = DirectoryNavigator::new();
        navigator.open(&id, None).unwrap();
        (registry, navigator, id)
    }

    #[test]
    fn navigation_follows_join_rules() {
        let (_registry, mut navigator, id) = setup();
        assert!(navigator.go_up(&id).is_none());
        assert_eq!(navigator.current_path(&id), Some("/"));

        navigator.navigate_into(&id, "etc").unwrap();
        assert_eq!(navigator.current_path(&id), Some("/etc"));

        navigator.navigate_to(&id, "/var/www").unwrap();
        navigator.navigate_into(&id, "html").unwrap();
        assert_eq!(navigator.current_path(&id), Some("/var/www/html"));

        navigator.go_up(&id);
        assert_eq!(navigator.current_path(&id), Some("/var/www"));
    }

    #[test]
    fn dot_entries_keep_the_path_well_formed() {
        let (_registry, mut navigator, id) = setup();
        navigator.navigate_to(&id, "/var/www").unwrap();

        for entry in ["..", ".", "html/../..", ""] {
            assert!(matches!(
                navigator.navigate_into(&id, entry),
                Err(CoreError::InvalidPath(_))
            ));
            assert_eq!(navigator.current_path(&id), Some("/var/www"));
        }

        navigator.go_up(&id).unwrap();
        assert_eq!(navigator.current_path(&id), Some("/var"));

        let ghost = SessionId::new("ghost");
        assert!(matches!(
            navigator.navigate_into(&ghost, "etc"),
            Err(CoreError::Unaddressable(_))
        ));
    }

    #[test]
    fn superseded_listing_is_discarded() {
        let (registry, mut navigator, id) = setup();
        let slow = navigator.navigate_into(&id, "etc").unwrap();
        let fast = navigator.go_up(&id).unwrap();

        assert!(navigator.set_entries(&registry, &id, fast.ticket, vec![DirectoryEntry::directory("etc")]));
        assert!(!navigator.set_entries(&registry, &id, slow.ticket, vec![DirectoryEntry::file("hosts", 1)]));

        let view = navigator.view(&id).unwrap();
        assert_eq!(view.current_path, "/");
        assert_eq!(view.entries[0].name, "etc");
        assert!(!view.is_loading);
    }

    #[test]
    fn failure_keeps_path() {
        let (registry, mut navigator, id) = setup();
        let req = navigator.navigate_into(&id, "missing").unwrap();
        assert!(navigator.view(&id).unwrap().is_loading);

        navigator.set_error(&registry, &id, req.ticket, "not found");
        let view = navigator.view(&id).unwrap();
        assert_eq!(view.current_path, "/missing");
        assert_eq!(view.error.as_deref(), Some("not found"));
        assert!(!view.is_loading);
    }

    #[test]
    fn listing_after_close_is_dropped() {
        let (mut registry, mut navigator, id) = setup();
        let req = navigator.refresh(&id).unwrap();
        registry.begin_close(&id);
        assert!(!navigator.set_entries(&registry, &id, req.ticket, Vec::new()));
    }

    #[test]
    fn file_ops_resolve_against_current_path() {
        let (_registry, mut navigator, id) = setup();
        navigator.navigate_to(&id, "/home/u").unwrap();

        let op = FileOp::Rename {
            from: "notes.txt".into(),
            to: "../shared/notes.txt".into(),
        };
        assert_eq!(
            navigator.resolve_op(&id, &op).unwrap(),
            FileOp::Rename {
                from: "/home/u/notes.txt".into(),
                to: "/home/shared/notes.txt".into(),
            }
        );
    }

    #[test]
    fn sorted_entries_lists_directories_first() {
        let (registry, mut navigator, id) = setup();
        let req = navigator.refresh(&id).unwrap();
        navigator.set_entries(
            &registry,
            &id,
            req.ticket,
            vec![
                DirectoryEntry::file("b.txt", 1),
                DirectoryEntry::directory("zeta"),
                DirectoryEntry::file("a.txt", 1),
            ],
        );
        let names: Vec<&str> = navigator
            .view(&id)
            .unwrap()
            .sorted_entries()
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["zeta", "a.txt", "b.txt"]);
    }
}
