use std::sync::Arc;

use super::model::{Anchor, CoralEvent};
use super::whiteboard::{CoralEventListener, EventWhiteboard, ListenerRef};

/// Re-fires every event it receives on another whiteboard.
struct EventRedirector {
    target: Arc<EventWhiteboard>,
}

impl CoralEventListener for EventRedirector {
    fn on_event(&self, event: &CoralEvent) {
        self.target.fire(event);
    }
}

/// The four whiteboards of a Coral instance and the routing between them.
///
/// ```text
///   local ──► global ◄── inbound ◄── bridge (remote frames)
///     │
///     └────► outbound ──► bridge (to remote)
/// ```
///
/// Mutations made through sessions of this instance are fired on `local`.
/// Events decoded from the remote channel are fired on `inbound`. Nothing is
/// ever redirected from `inbound` to `outbound`, so remote events are not echoed
/// back.
pub struct EventHub {
    local: Arc<EventWhiteboard>,
    inbound: Arc<EventWhiteboard>,
    outbound: Arc<EventWhiteboard>,
    global: Arc<EventWhiteboard>,
}

impl EventHub {
    pub fn new() -> Self {
        let hub = Self {
            local: Arc::new(EventWhiteboard::new("local")),
            inbound: Arc::new(EventWhiteboard::new("inbound")),
            outbound: Arc::new(EventWhiteboard::new("outbound")),
            global: Arc::new(EventWhiteboard::new("global")),
        };
        redirect(&hub.local, &hub.global);
        redirect(&hub.local, &hub.outbound);
        redirect(&hub.inbound, &hub.global);
        hub
    }

    /// Events caused by this instance
    pub fn local(&self) -> &Arc<EventWhiteboard> {
        &self.local
    }

    /// Events received from remote instances
    pub fn inbound(&self) -> &Arc<EventWhiteboard> {
        &self.inbound
    }

    /// Local events to be sent to remote instances
    pub fn outbound(&self) -> &Arc<EventWhiteboard> {
        &self.outbound
    }

    /// Local and inbound events together
    pub fn global(&self) -> &Arc<EventWhiteboard> {
        &self.global
    }

    pub(crate) fn fire_local(&self, events: Vec<CoralEvent>) {
        for event in &events {
            self.local.fire(event);
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

fn redirect(source: &EventWhiteboard, target: &Arc<EventWhiteboard>) {
    let redirector: ListenerRef = Arc::new(EventRedirector {
        target: target.clone(),
    });
    source.add_listener_for_all(redirector, Anchor::Any);
}
