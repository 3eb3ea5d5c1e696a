//! Session registry: the single source of truth for session addressability

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use super::types::{Lifecycle, Session, SessionId};
use crate::error::{CoreError, CoreResult};

/// Owns every session record and the tombstones of closed sessions
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    tombstones: HashSet<SessionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session the transport has just created, in `Connecting`
    pub fn register(
        &mut self,
        id: SessionId,
        display_name: impl Into<String>,
        host_address: impl Into<String>,
    ) -> CoreResult<()> {
        if self.tombstones.contains(&id) || self.sessions.contains_key(&id) {
            warn!("Transport reused session id {}, refusing to register", id);
            return Err(CoreError::Unaddressable(id));
        }

        let session = Session::new(id.clone(), display_name, host_address);
        debug!("Registered session {} ({})", id, session.host_address);
        self.sessions.insert(id, session);
        Ok(())
    }

    /// `Connecting -> Active`
    pub fn activate(&mut self, id: &SessionId) -> bool {
        self.transition(id, Lifecycle::Active)
    }

    /// `Active|Connecting -> Closing`; false for unknown or already closing ids
    pub fn begin_close(&mut self, id: &SessionId) -> bool {
        self.transition(id, Lifecycle::Closing)
    }

    /// `Closing -> Closed`, leaving a tombstone behind
    pub fn finish_close(&mut self, id: &SessionId) -> bool {
        match self.sessions.get(id) {
            Some(session) if session.lifecycle.can_transition_to(Lifecycle::Closed) => {
                self.sessions.remove(id);
                self.tombstones.insert(id.clone());
                info!("Session {} closed", id);
                true
            }
            _ => false,
        }
    }

    fn transition(&mut self, id: &SessionId, next: Lifecycle) -> bool {
        match self.sessions.get_mut(id) {
            Some(session) if session.lifecycle.can_transition_to(next) => {
                debug!("Session {}: {:?} -> {:?}", id, session.lifecycle, next);
                session.lifecycle = next;
                true
            }
            Some(session) => {
                debug!(
                    "Ignoring transition {:?} -> {:?} for session {}",
                    session.lifecycle, next, id
                );
                false
            }
            None => false,
        }
    }

    /// Whether events and actions for `id` may touch session-scoped state
    pub fn is_addressable(&self, id: &SessionId) -> bool {
        matches!(
            self.sessions.get(id),
            Some(session) if session.lifecycle == Lifecycle::Active
        )
    }

    /// Error form of [`is_addressable`](Self::is_addressable) for caller actions
    pub fn ensure_addressable(&self, id: &SessionId) -> CoreResult<()> {
        if self.is_addressable(id) {
            Ok(())
        } else {
            Err(CoreError::Unaddressable(id.clone()))
        }
    }

    pub fn is_tombstoned(&self, id: &SessionId) -> bool {
        self.tombstones.contains(id)
    }

    pub fn lifecycle(&self, id: &SessionId) -> Option<Lifecycle> {
        if self.tombstones.contains(id) {
            return Some(Lifecycle::Closed);
        }
        self.sessions.get(id).map(|session| session.lifecycle)
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Active sessions, oldest first
    pub fn list_active(&self) -> Vec<Session> {
        let mut active: Vec<Session> = self
            .sessions
            .values()
            .filter(|session| session.lifecycle == Lifecycle::Active)
            .cloned()
            .collect();
        active.sort_by_key(|session| session.created_at);
        active
    }

    /// Ids of sessions that are not yet closed
    pub fn live_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|session| session.lifecycle == Lifecycle::Active)
            .count()
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(registry: &mut SessionRegistry, id: &str) -> SessionId {
        let id = SessionId::new(id);
        registry.register(id.clone(), "name", "host:22").unwrap();
        assert!(registry.activate(&id));
        id
    }

    #[test]
    fn connecting_session_is_not_addressable() {
        let mut registry = SessionRegistry::new();
        let id = SessionId::new("s1");
        registry.register(id.clone(), "name", "host:22").unwrap();

        assert!(!registry.is_addressable(&id));
        assert!(registry.activate(&id));
        assert!(registry.is_addressable(&id));
    }

    #[test]
    fn close_leaves_a_tombstone() {
        let mut registry = SessionRegistry::new();
        let id = active(&mut registry, "s1");

        assert!(registry.begin_close(&id));
        assert!(!registry.is_addressable(&id));
        assert!(registry.finish_close(&id));

        assert!(registry.is_tombstoned(&id));
        assert_eq!(registry.lifecycle(&id), Some(Lifecycle::Closed));
        assert!(registry.ensure_addressable(&id).is_err());
    }

    #[test]
    fn closing_unknown_or_closed_is_a_noop() {
        let mut registry = SessionRegistry::new();
        let id = active(&mut registry, "s1");
        registry.begin_close(&id);
        registry.finish_close(&id);

        assert!(!registry.begin_close(&id));
        assert!(!registry.finish_close(&id));
        assert!(!registry.begin_close(&SessionId::new("ghost")));
    }

    #[test]
    fn tombstoned_id_cannot_be_revived() {
        let mut registry = SessionRegistry::new();
        let id = active(&mut registry, "s1");
        registry.begin_close(&id);
        registry.finish_close(&id);

        assert!(registry.register(id.clone(), "again", "host:22").is_err());
        assert!(!registry.activate(&id));
        assert!(!registry.is_addressable(&id));
    }

    #[test]
    fn list_active_skips_closing_sessions() {
        let mut registry = SessionRegistry::new();
        let a = active(&mut registry, "a");
        let _b = active(&mut registry, "b");
        registry.begin_close(&a);

        let listed: Vec<String> = registry
            .list_active()
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(listed, vec!["b"]);
        assert_eq!(registry.active_count(), 1);
    }
}
