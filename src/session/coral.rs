use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use super::coral_session::CoralSession;
use super::pool::SessionPool;
use crate::config::CoralConfig;
use crate::databases::SledStore;
use crate::error::CoralResult;
use crate::event::{EventBridge, EventHub, RemoteChannel};
use crate::state::CoralState;

/// Everything a Coral instance shares between its sessions.
pub(crate) struct CoralCore {
    pub config: CoralConfig,
    pub db: SledStore,
    pub state: RwLock<CoralState>,
    pub events: EventHub,
    pub pool: SessionPool,
}

impl CoralCore {
    pub fn read<T>(&self, op: impl FnOnce(&CoralState) -> CoralResult<T>) -> CoralResult<T> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        op(&state)
    }

    /// Run a mutation under the write lock, then fire the events it queued.
    ///
    /// The mutation's changes are committed only if it succeeds; otherwise
    /// they are rolled back and nothing fires. Events are fired after the lock
    /// is released so listeners may call back into Coral.
    pub fn mutate<T>(&self, op: impl FnOnce(&mut CoralState) -> CoralResult<T>) -> CoralResult<T> {
        let (value, events) = {
            let mut state = self.state.write().unwrap_or_else(|poisoned| {
                // a mutation panicked part way; drop whatever it left behind
                let mut state = poisoned.into_inner();
                state.rollback();
                state
            });
            match op(&mut state).and_then(|value| state.commit().map(|()| value)) {
                Ok(value) => (value, state.take_events()),
                Err(err) => {
                    log::debug!("rolling back failed mutation: {err}");
                    state.rollback();
                    return Err(err);
                }
            }
        };
        self.events.fire_local(events);
        Ok(value)
    }
}

/// An open Coral instance.
///
/// Cloning is cheap; clones share storage, sessions and event hub.
///
/// ```
/// use coral::Coral;
///
/// let coral = Coral::temp().unwrap();
/// let session = coral.root_session().unwrap();
/// let root = session.store().root_resource().unwrap();
/// assert_eq!(session.store().path(root.id()).unwrap(), "/");
/// ```
#[derive(Clone)]
pub struct Coral {
    core: Arc<CoralCore>,
}

impl Coral {
    /// Open the database described by `config`, bootstrapping it when empty.
    pub fn open(config: CoralConfig) -> CoralResult<Self> {
        let db = SledStore::open(&config)?;
        let state = CoralState::load(db.clone(), &config)?;
        let pool = SessionPool::new(config.max_idle_sessions);
        Ok(Self {
            core: Arc::new(CoralCore {
                config,
                db,
                state: RwLock::new(state),
                events: EventHub::new(),
                pool,
            }),
        })
    }

    /// Open a temporary instance, removed when the last handle is dropped
    pub fn temp() -> CoralResult<Self> {
        Self::open(CoralConfig::temp())
    }

    /// Borrow a session acting for the subject called `principal`.
    ///
    /// The session is bound to the calling thread and becomes its current
    /// session.
    pub fn session(&self, principal: &str) -> CoralResult<CoralSession> {
        let subject = self
            .core
            .read(|state| Ok(state.security.subjects.get_by_name(principal)?.id()))?;
        let pooled = self.core.pool.borrow(principal, subject);
        Ok(CoralSession::open(self.core.clone(), principal, pooled))
    }

    pub fn root_session(&self) -> CoralResult<CoralSession> {
        self.session(&self.core.config.root_subject)
    }

    pub fn anonymous_session(&self) -> CoralResult<CoralSession> {
        self.session(&self.core.config.anonymous_subject)
    }

    pub fn event_hub(&self) -> &EventHub {
        &self.core.events
    }

    /// Connect this instance's event hub to a remote channel.
    ///
    /// The bridge stays attached until the returned handle is dropped.
    pub fn attach_bridge(&self, origin: u64, channel: Arc<dyn RemoteChannel>) -> Arc<EventBridge> {
        EventBridge::attach(&self.core.events, origin, channel)
    }

    pub fn config(&self) -> &CoralConfig {
        &self.core.config
    }

    /// Flush pending writes to disk, returning the number of bytes written
    pub fn flush(&self) -> CoralResult<usize> {
        self.core.db.flush()
    }

    /// Idle sessions currently pooled for `principal`
    pub fn idle_sessions(&self, principal: &str) -> usize {
        self.core.pool.idle(principal)
    }
}

impl fmt::Debug for Coral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coral")
            .field("path", &self.core.config.path)
            .finish_non_exhaustive()
    }
}
