//! In-memory negotiation session map

use crate::error::{EngineError, EngineResult};
use accord_types::{NegotiationId, NegotiationSession};
use dashmap::DashMap;

/// Concurrent map of live and terminal sessions.
///
/// Update closures run under the entry's shard lock and must not touch the
/// map again.
pub struct SessionMap {
    sessions: DashMap<NegotiationId, NegotiationSession>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn insert(&self, session: NegotiationSession) {
        self.sessions.insert(session.id, session);
    }

    pub fn get(&self, id: &NegotiationId) -> Option<NegotiationSession> {
        self.sessions.get(id).map(|s| s.clone())
    }

    /// Apply an infallible edit, bumping `updated_at`.
    pub fn update<T>(
        &self,
        id: &NegotiationId,
        f: impl FnOnce(&mut NegotiationSession) -> T,
    ) -> EngineResult<T> {
        match self.sessions.get_mut(id) {
            Some(mut entry) => {
                let value = f(entry.value_mut());
                entry.touch();
                Ok(value)
            }
            None => Err(EngineError::SessionNotFound(*id)),
        }
    }

    /// Apply a fallible edit; `updated_at` is bumped only on success.
    pub fn try_update<T>(
        &self,
        id: &NegotiationId,
        f: impl FnOnce(&mut NegotiationSession) -> EngineResult<T>,
    ) -> EngineResult<T> {
        match self.sessions.get_mut(id) {
            Some(mut entry) => {
                let result = f(entry.value_mut());
                if result.is_ok() {
                    entry.touch();
                }
                result
            }
            None => Err(EngineError::SessionNotFound(*id)),
        }
    }

    /// All sessions, oldest first.
    pub fn list(&self) -> Vec<NegotiationSession> {
        let mut sessions: Vec<_> = self.sessions.iter().map(|s| s.clone()).collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionMap {
    fn default() -> Self {
        Self::new()
    }
}
