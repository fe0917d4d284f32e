//! Prelude module for convenient imports.
//!
//! ```rust
//! use coral::prelude::*;
//! ```

pub use crate::config::CoralConfig;
pub use crate::entity::{
    AttributeClassId, AttributeDefinitionId, PermissionId, ResourceClassId, ResourceId, RoleId,
    SubjectId,
};
pub use crate::error::{CoralError, CoralResult, EntityKind, SessionError};
pub use crate::event::{
    Anchor, CoralEvent, CoralEventListener, EventHub, EventKind, EventWhiteboard, ListenerRef,
};
pub use crate::schema::{
    AttributeClass, AttributeDefinition, AttributeFlags, AttributeType, AttributeValue,
    NewAttribute, ResourceClass, ResourceClassFlags,
};
pub use crate::security::{Permission, PermissionAssignment, Role, RoleAssignment, Subject};
pub use crate::session::{Coral, CoralSession};
pub use crate::store::Resource;
