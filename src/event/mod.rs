//! Typed change notifications.
//!
//! Every mutation made through a session produces one or more [`CoralEvent`]s.
//! They are delivered synchronously through [`EventWhiteboard`]s, after the
//! mutation has completed and released Coral's internal locks, so listeners are
//! free to open sessions and read or modify the store themselves.
//!
//! Listeners attach to an event kind on an [`Anchor`]: either a specific entity
//! or [`Anchor::Any`]. An event is delivered to every entity it concerns, so a
//! role assignment reaches listeners anchored on the subject and on the role.
//!
//! The [`EventHub`] routes events between the local, inbound, outbound and
//! global whiteboards, and an [`EventBridge`] carries outbound events to other
//! instances as bincode frames.

pub mod bridge;
pub mod hub;
pub mod model;
pub mod whiteboard;

pub use bridge::{ChannelTransport, EventBridge, EventFrame, RemoteChannel, WIRE_VERSION};
pub use hub::EventHub;
pub use model::{Anchor, CoralEvent, EventKind};
pub use whiteboard::{CoralEventListener, EventWhiteboard, ListenerRef};
