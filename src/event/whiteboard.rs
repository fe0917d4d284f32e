//! Listener registration and synchronous dispatch keyed by event kind and anchor.
//!
//! Listeners are registered for an [`EventKind`] on an [`Anchor`]. When an event
//! is fired, every registration matching one of the event's anchors is invoked,
//! followed by the registrations on [`Anchor::Any`]. A listener registered on two
//! anchors that both appear in an event is invoked once for each of them.
//!
//! Dispatch runs on a snapshot of the registrations taken before the first
//! listener is called, so listeners may register or unregister (themselves
//! included) while an event is being delivered. Firing on a whiteboard from a
//! listener registered on that same whiteboard recurses; avoid it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use strum::IntoEnumIterator;

use super::model::{Anchor, CoralEvent, EventKind};

/// Receives events from a whiteboard.
///
/// Closures taking `&CoralEvent` implement this trait.
pub trait CoralEventListener: Send + Sync {
    fn on_event(&self, event: &CoralEvent);
}

impl<F> CoralEventListener for F
where
    F: Fn(&CoralEvent) + Send + Sync,
{
    fn on_event(&self, event: &CoralEvent) {
        self(event)
    }
}

/// Shared handle to a registered listener. Registrations are compared by pointer.
pub type ListenerRef = Arc<dyn CoralEventListener>;

pub struct EventWhiteboard {
    name: &'static str,
    listeners: RwLock<HashMap<(EventKind, Anchor), Vec<ListenerRef>>>,
}

impl EventWhiteboard {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            listeners: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register `listener` for events of `kind` concerning `anchor`.
    ///
    /// Returns `false` if the listener was already registered there.
    pub fn add_listener(&self, kind: EventKind, listener: ListenerRef, anchor: Anchor) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let slot = listeners.entry((kind, anchor)).or_default();
        if slot.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }
        slot.push(listener);
        true
    }

    /// Register `listener` for every event kind on `anchor`.
    pub fn add_listener_for_all(&self, listener: ListenerRef, anchor: Anchor) {
        for kind in EventKind::iter() {
            self.add_listener(kind, listener.clone(), anchor);
        }
    }

    /// Returns `true` if the registration existed.
    pub fn remove_listener(&self, kind: EventKind, listener: &ListenerRef, anchor: Anchor) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = listeners.get_mut(&(kind, anchor)) else {
            return false;
        };
        let before = slot.len();
        slot.retain(|l| !Arc::ptr_eq(l, listener));
        let removed = slot.len() != before;
        if slot.is_empty() {
            listeners.remove(&(kind, anchor));
        }
        removed
    }

    /// Drop every registration of `listener`, returning how many were removed.
    pub fn remove_listener_everywhere(&self, listener: &ListenerRef) -> usize {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        listeners.retain(|_, slot| {
            let before = slot.len();
            slot.retain(|l| !Arc::ptr_eq(l, listener));
            removed += before - slot.len();
            !slot.is_empty()
        });
        removed
    }

    /// Total number of registrations
    pub fn listener_count(&self) -> usize {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        listeners.values().map(Vec::len).sum()
    }

    /// Deliver `event` to its anchors' listeners, then to `Any` listeners.
    ///
    /// Returns the number of listener invocations.
    pub fn fire(&self, event: &CoralEvent) -> usize {
        let kind = event.kind();
        let targets: Vec<ListenerRef> = {
            let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
            event
                .anchors()
                .into_iter()
                .chain(std::iter::once(Anchor::Any))
                .filter_map(|anchor| listeners.get(&(kind, anchor)))
                .flatten()
                .cloned()
                .collect()
        };

        log::trace!(
            "{} whiteboard: {} delivered to {} listeners",
            self.name,
            kind,
            targets.len()
        );
        for listener in &targets {
            listener.on_event(event);
        }
        targets.len()
    }
}

impl fmt::Debug for EventWhiteboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventWhiteboard")
            .field("name", &self.name)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ResourceId, RoleId, SubjectId};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, ListenerRef) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let listener: ListenerRef = Arc::new(move |_: &CoralEvent| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, listener)
    }

    fn assignment(subject: u64, role: u64) -> CoralEvent {
        CoralEvent::RoleAssignmentChange {
            subject: SubjectId(subject),
            role: RoleId(role),
            added: true,
        }
    }

    #[test]
    fn test_anchor_filters_delivery() {
        let board = EventWhiteboard::new("test");
        let (count, listener) = counter();
        board.add_listener(
            EventKind::RoleAssignmentChange,
            listener,
            Anchor::Subject(SubjectId(1)),
        );

        board.fire(&assignment(1, 5));
        board.fire(&assignment(2, 5));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_any_receives_everything_once() {
        let board = EventWhiteboard::new("test");
        let (count, listener) = counter();
        board.add_listener(EventKind::RoleAssignmentChange, listener, Anchor::Any);

        board.fire(&assignment(1, 5));
        board.fire(&assignment(2, 6));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_kind_filters_delivery() {
        let board = EventWhiteboard::new("test");
        let (count, listener) = counter();
        board.add_listener(EventKind::RoleChange, listener, Anchor::Any);

        board.fire(&assignment(1, 5));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_listener_on_two_anchors_of_one_event_is_called_twice() {
        let board = EventWhiteboard::new("test");
        let (count, listener) = counter();
        board.add_listener(
            EventKind::RoleAssignmentChange,
            listener.clone(),
            Anchor::Subject(SubjectId(1)),
        );
        board.add_listener(
            EventKind::RoleAssignmentChange,
            listener,
            Anchor::Role(RoleId(5)),
        );

        assert_eq!(board.fire(&assignment(1, 5)), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_duplicate_registration_is_ignored() {
        let board = EventWhiteboard::new("test");
        let (_, listener) = counter();
        assert!(board.add_listener(EventKind::RoleChange, listener.clone(), Anchor::Any));
        assert!(!board.add_listener(EventKind::RoleChange, listener.clone(), Anchor::Any));
        assert_eq!(board.listener_count(), 1);

        assert!(board.remove_listener(EventKind::RoleChange, &listener, Anchor::Any));
        assert!(!board.remove_listener(EventKind::RoleChange, &listener, Anchor::Any));
        assert_eq!(board.listener_count(), 0);
    }

    #[test]
    fn test_listener_may_unregister_itself_during_dispatch() {
        let board = Arc::new(EventWhiteboard::new("test"));
        let slot: Arc<Mutex<Option<ListenerRef>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let listener: ListenerRef = {
            let board = board.clone();
            let slot = slot.clone();
            let calls = calls.clone();
            Arc::new(move |_: &CoralEvent| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(me) = slot.lock().unwrap().take() {
                    board.remove_listener_everywhere(&me);
                }
            })
        };
        *slot.lock().unwrap() = Some(listener.clone());
        board.add_listener_for_all(listener, Anchor::Resource(ResourceId(1)));

        let event = CoralEvent::ResourceTreeDeletion {
            root: ResourceId(1),
        };
        board.fire(&event);
        board.fire(&event);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(board.listener_count(), 0);
    }
}
