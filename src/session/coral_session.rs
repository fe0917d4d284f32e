use std::cell::Cell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

use super::coral::CoralCore;
use super::pool::PooledSession;
use crate::entity::SubjectId;
use crate::error::{CoralResult, SessionError};
use crate::event::EventWhiteboard;
use crate::schema::CoralSchema;
use crate::security::{CoralSecurity, Subject};
use crate::state::CoralState;
use crate::store::CoralStore;

thread_local! {
    static CURRENT_SESSION: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Id of the session current on the calling thread
pub fn current_session_id() -> Option<u64> {
    CURRENT_SESSION.get()
}

/// A principal's handle on a Coral instance.
///
/// A session belongs to the thread that borrowed it and becomes that thread's
/// current session. Every call verifies that it is made on the owning thread,
/// that the session is still the current one there, and that it has not been
/// closed. Closing (or dropping) returns the session to the pool.
pub struct CoralSession {
    core: Arc<CoralCore>,
    id: u64,
    principal: String,
    subject: SubjectId,
    owner: ThreadId,
    closed: AtomicBool,
}

impl CoralSession {
    pub(crate) fn open(core: Arc<CoralCore>, principal: &str, pooled: PooledSession) -> Self {
        let session = Self {
            core,
            id: pooled.id,
            principal: principal.to_owned(),
            subject: pooled.subject,
            owner: thread::current().id(),
            closed: AtomicBool::new(false),
        };
        CURRENT_SESSION.set(Some(session.id));
        log::debug!("session {} opened for {principal}", session.id);
        session
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name the session was borrowed for
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Id of the subject the session acts for
    pub fn subject_id(&self) -> SubjectId {
        self.subject
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Fails unless the call comes from the owning thread, on which this
    /// session is current, and the session is open.
    pub fn verify(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        if thread::current().id() != self.owner {
            return Err(SessionError::WrongThread);
        }
        if CURRENT_SESSION.get() != Some(self.id) {
            return Err(SessionError::NotCurrent);
        }
        Ok(())
    }

    /// Make this the current session of its owning thread
    pub fn make_current(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        if thread::current().id() != self.owner {
            return Err(SessionError::WrongThread);
        }
        CURRENT_SESSION.set(Some(self.id));
        Ok(())
    }

    /// Close the session and return it to the pool. Closing twice is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if thread::current().id() == self.owner && CURRENT_SESSION.get() == Some(self.id) {
            CURRENT_SESSION.set(None);
        }
        let pooled = PooledSession {
            id: self.id,
            subject: self.subject,
        };
        let kept = self.core.pool.release(&self.principal, pooled);
        log::debug!(
            "session {} closed for {} ({})",
            self.id,
            self.principal,
            if kept { "pooled" } else { "discarded" }
        );
    }

    /// The subject this session acts for
    pub fn user_subject(&self) -> CoralResult<Subject> {
        self.read(|state, subject| state.security.subjects.get(subject).cloned())
    }

    pub fn schema(&self) -> CoralSchema<'_> {
        CoralSchema::new(self)
    }

    pub fn security(&self) -> CoralSecurity<'_> {
        CoralSecurity::new(self)
    }

    pub fn store(&self) -> CoralStore<'_> {
        CoralStore::new(self)
    }

    /// The global whiteboard, carrying local and inbound events
    pub fn event(&self) -> CoralResult<&EventWhiteboard> {
        self.verify()?;
        Ok(self.core.events.global().as_ref())
    }

    pub(crate) fn read<T>(
        &self,
        op: impl FnOnce(&CoralState, SubjectId) -> CoralResult<T>,
    ) -> CoralResult<T> {
        self.verify()?;
        self.core.read(|state| op(state, self.subject))
    }

    pub(crate) fn mutate<T>(
        &self,
        op: impl FnOnce(&mut CoralState, SubjectId) -> CoralResult<T>,
    ) -> CoralResult<T> {
        self.verify()?;
        self.core.mutate(|state| op(state, self.subject))
    }
}

impl Drop for CoralSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for CoralSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoralSession")
            .field("id", &self.id)
            .field("principal", &self.principal)
            .field("subject", &self.subject)
            .field("closed", &self.is_closed())
            .finish()
    }
}
