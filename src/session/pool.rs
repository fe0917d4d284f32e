use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::entity::SubjectId;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a session parked in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PooledSession {
    pub id: u64,
    pub subject: SubjectId,
}

impl PooledSession {
    pub fn fresh(subject: SubjectId) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            subject,
        }
    }
}

/// Idle sessions keyed by principal name, at most `max_idle` per principal.
#[derive(Debug)]
pub(crate) struct SessionPool {
    idle: Mutex<HashMap<String, Vec<PooledSession>>>,
    max_idle: usize,
}

impl SessionPool {
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(HashMap::new()),
            max_idle,
        }
    }

    /// Reuse an idle session of `principal` if it still acts for `subject`,
    /// otherwise allocate a new one.
    pub fn borrow(&self, principal: &str, subject: SubjectId) -> PooledSession {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sessions) = idle.get_mut(principal) {
            // a principal deleted and recreated has a new subject id
            sessions.retain(|s| s.subject == subject);
            if let Some(session) = sessions.pop() {
                log::trace!("reusing session {} for {principal}", session.id);
                return session;
            }
        }
        drop(idle);
        let session = PooledSession::fresh(subject);
        log::trace!("new session {} for {principal}", session.id);
        session
    }

    /// Park a closed session. Returns `false` when the pool is full and the
    /// session was discarded.
    pub fn release(&self, principal: &str, session: PooledSession) -> bool {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        let sessions = idle.entry(principal.to_owned()).or_default();
        if sessions.len() >= self.max_idle {
            return false;
        }
        sessions.push(session);
        true
    }

    pub fn idle(&self, principal: &str) -> usize {
        let idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        idle.get(principal).map_or(0, Vec::len)
    }
}
