//! Serialization bridge between the event hub and a remote notification channel.
//!
//! Outbound events are wrapped in an [`EventFrame`] and encoded with bincode.
//! Each frame names the instance it originated from, so a bridge that hears its
//! own frames back (a shared bus, a broadcast topic) drops them instead of
//! firing them again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::sync::{Arc, Weak};

use bincode::config::standard;

use super::hub::EventHub;
use super::model::{Anchor, CoralEvent};
use super::whiteboard::{CoralEventListener, EventWhiteboard, ListenerRef};
use crate::error::{CoralError, CoralResult};

/// Version of the frame layout written by this build
pub const WIRE_VERSION: u8 = 1;

/// One event on the wire.
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct EventFrame {
    pub version: u8,
    /// Node id of the sending instance
    pub origin: u64,
    /// Per-origin sequence number, starting at 0
    pub sequence: u64,
    pub event: CoralEvent,
}

impl EventFrame {
    pub fn encode(&self) -> CoralResult<Vec<u8>> {
        Ok(bincode::encode_to_vec(self, standard())?)
    }

    pub fn decode(bytes: &[u8]) -> CoralResult<Self> {
        let version = *bytes
            .first()
            .ok_or_else(|| CoralError::Bridge("empty frame".into()))?;
        if version != WIRE_VERSION {
            return Err(CoralError::Bridge(format!(
                "unsupported frame version {version}, expected {WIRE_VERSION}"
            )));
        }
        let (frame, read) = bincode::decode_from_slice::<EventFrame, _>(bytes, standard())?;
        if read != bytes.len() {
            return Err(CoralError::Bridge(format!(
                "{} trailing bytes after frame",
                bytes.len() - read
            )));
        }
        Ok(frame)
    }
}

/// Transport carrying encoded frames to other instances.
pub trait RemoteChannel: Send + Sync {
    fn send(&self, frame: Vec<u8>) -> CoralResult<()>;
}

/// In-process [`RemoteChannel`] over a standard library channel.
pub struct ChannelTransport {
    sender: Sender<Vec<u8>>,
}

impl ChannelTransport {
    /// Create a transport and the receiving end of its frames
    pub fn pair() -> (Self, Receiver<Vec<u8>>) {
        let (sender, receiver) = channel();
        (Self { sender }, receiver)
    }
}

impl RemoteChannel for ChannelTransport {
    fn send(&self, frame: Vec<u8>) -> CoralResult<()> {
        self.sender
            .send(frame)
            .map_err(|_| CoralError::Bridge("remote channel disconnected".into()))
    }
}

/// Forwards outbound events to the bridge without keeping it alive.
struct OutboundForwarder {
    bridge: Weak<EventBridge>,
}

impl CoralEventListener for OutboundForwarder {
    fn on_event(&self, event: &CoralEvent) {
        if let Some(bridge) = self.bridge.upgrade() {
            if let Err(err) = bridge.send(event) {
                log::warn!("event bridge {}: dropping {}: {}", bridge.origin, event.kind(), err);
            }
        }
    }
}

/// Connects an [`EventHub`] to a [`RemoteChannel`].
///
/// The bridge listens on the hub's outbound whiteboard and fires received frames
/// on its inbound whiteboard. Dropping the bridge detaches it.
pub struct EventBridge {
    origin: u64,
    sequence: AtomicU64,
    channel: Arc<dyn RemoteChannel>,
    inbound: Arc<EventWhiteboard>,
    outbound: Arc<EventWhiteboard>,
    forwarder: ListenerRef,
}

impl EventBridge {
    pub fn attach(hub: &EventHub, origin: u64, channel: Arc<dyn RemoteChannel>) -> Arc<Self> {
        let bridge = Arc::new_cyclic(|weak| EventBridge {
            origin,
            sequence: AtomicU64::new(0),
            channel,
            inbound: hub.inbound().clone(),
            outbound: hub.outbound().clone(),
            forwarder: Arc::new(OutboundForwarder {
                bridge: weak.clone(),
            }),
        });
        bridge
            .outbound
            .add_listener_for_all(bridge.forwarder.clone(), Anchor::Any);
        log::debug!("event bridge {origin} attached");
        bridge
    }

    pub fn origin(&self) -> u64 {
        self.origin
    }

    /// Number of frames sent so far
    pub fn sent(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    fn send(&self, event: &CoralEvent) -> CoralResult<()> {
        let frame = EventFrame {
            version: WIRE_VERSION,
            origin: self.origin,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            event: event.clone(),
        };
        self.channel.send(frame.encode()?)
    }

    /// Decode a frame and fire its event inbound.
    ///
    /// Returns `false` when the frame came from this bridge's own origin.
    pub fn receive(&self, bytes: &[u8]) -> CoralResult<bool> {
        let frame = EventFrame::decode(bytes)?;
        if frame.origin == self.origin {
            log::trace!("event bridge {}: ignoring own frame {}", self.origin, frame.sequence);
            return Ok(false);
        }
        log::trace!(
            "event bridge {}: {} from {} #{}",
            self.origin,
            frame.event.kind(),
            frame.origin,
            frame.sequence
        );
        self.inbound.fire(&frame.event);
        Ok(true)
    }

    /// Receive every frame currently queued on `receiver`.
    ///
    /// Undecodable frames are logged and skipped. Returns the number of events
    /// fired inbound.
    pub fn pump(&self, receiver: &Receiver<Vec<u8>>) -> CoralResult<usize> {
        let mut fired = 0;
        loop {
            match receiver.try_recv() {
                Ok(bytes) => match self.receive(&bytes) {
                    Ok(true) => fired += 1,
                    Ok(false) => {}
                    Err(err) => log::warn!("event bridge {}: bad frame: {}", self.origin, err),
                },
                Err(TryRecvError::Empty) => return Ok(fired),
                Err(TryRecvError::Disconnected) if fired > 0 => return Ok(fired),
                Err(TryRecvError::Disconnected) => {
                    return Err(CoralError::Bridge("remote channel disconnected".into()));
                }
            }
        }
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        self.outbound.remove_listener_everywhere(&self.forwarder);
        log::debug!("event bridge {} detached", self.origin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ResourceClassId, ResourceId};
    use crate::event::EventKind;
    use std::sync::Mutex;

    fn creation() -> CoralEvent {
        CoralEvent::ResourceCreation {
            resource: ResourceId(10),
            resource_class: ResourceClassId(3),
        }
    }

    #[test]
    fn test_frame_layout_starts_with_version() {
        let frame = EventFrame {
            version: WIRE_VERSION,
            origin: 7,
            sequence: 0,
            event: creation(),
        };
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes[0], WIRE_VERSION);
        assert_eq!(EventFrame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_rejects_unknown_version_and_garbage() {
        let mut bytes = EventFrame {
            version: WIRE_VERSION,
            origin: 1,
            sequence: 0,
            event: creation(),
        }
        .encode()
        .unwrap();
        bytes[0] = 99;
        assert!(matches!(EventFrame::decode(&bytes), Err(CoralError::Bridge(_))));
        assert!(matches!(EventFrame::decode(&[]), Err(CoralError::Bridge(_))));
        assert!(EventFrame::decode(&[WIRE_VERSION, 0xff, 0xff]).is_err());
    }

    #[test]
    fn test_two_hubs_exchange_events_without_echo() {
        let hub_a = EventHub::new();
        let hub_b = EventHub::new();
        let (to_b, rx_b) = ChannelTransport::pair();
        let (to_a, rx_a) = ChannelTransport::pair();
        let bridge_a = EventBridge::attach(&hub_a, 1, Arc::new(to_b));
        let bridge_b = EventBridge::attach(&hub_b, 2, Arc::new(to_a));

        let seen_b = Arc::new(Mutex::new(Vec::new()));
        let sink = seen_b.clone();
        hub_b.global().add_listener(
            EventKind::ResourceCreation,
            Arc::new(move |e: &CoralEvent| sink.lock().unwrap().push(e.clone())),
            Anchor::ResourceClass(ResourceClassId(3)),
        );

        hub_a.fire_local(vec![creation()]);
        assert_eq!(bridge_a.sent(), 1);
        assert_eq!(bridge_b.pump(&rx_b).unwrap(), 1);
        assert_eq!(*seen_b.lock().unwrap(), vec![creation()]);

        // inbound events never reach B's outbound, so nothing travels back to A
        assert_eq!(bridge_b.sent(), 0);
        assert_eq!(bridge_a.pump(&rx_a).unwrap(), 0);
    }

    #[test]
    fn test_own_frames_are_dropped() {
        let hub = EventHub::new();
        let (transport, rx) = ChannelTransport::pair();
        let bridge = EventBridge::attach(&hub, 5, Arc::new(transport));

        let seen = Arc::new(Mutex::new(0usize));
        let sink = seen.clone();
        hub.inbound().add_listener_for_all(
            Arc::new(move |_: &CoralEvent| *sink.lock().unwrap() += 1),
            Anchor::Any,
        );

        hub.fire_local(vec![creation()]);
        assert_eq!(bridge.pump(&rx).unwrap(), 0);
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn test_drop_detaches_from_outbound() {
        let hub = EventHub::new();
        let baseline = hub.outbound().listener_count();
        let (transport, _rx) = ChannelTransport::pair();
        let bridge = EventBridge::attach(&hub, 1, Arc::new(transport));
        assert!(hub.outbound().listener_count() > baseline);
        drop(bridge);
        assert_eq!(hub.outbound().listener_count(), baseline);
    }
}
