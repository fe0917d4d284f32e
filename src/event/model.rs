use strum::{EnumDiscriminants, EnumIter, IntoStaticStr};

use crate::entity::{
    AttributeClassId, AttributeDefinitionId, PermissionId, ResourceClassId, ResourceId, RoleId,
    SubjectId,
};

/// A change notification published through the event whiteboards.
///
/// Events carry ids rather than entity snapshots, so they can be shipped to
/// other nodes as they are. Receivers look entities up through their own session.
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode, EnumDiscriminants)]
#[strum_discriminants(name(EventKind))]
#[strum_discriminants(derive(Hash, EnumIter, IntoStaticStr, strum::Display))]
#[strum_discriminants(strum(serialize_all = "snake_case"))]
pub enum CoralEvent {
    AttributeClassChange {
        attribute_class: AttributeClassId,
    },
    AttributeDefinitionChange {
        attribute: AttributeDefinitionId,
        resource_class: ResourceClassId,
    },
    ResourceClassChange {
        resource_class: ResourceClassId,
    },
    ResourceClassAttributesChange {
        resource_class: ResourceClassId,
        attribute: AttributeDefinitionId,
        added: bool,
    },
    ResourceClassInheritanceChange {
        parent: ResourceClassId,
        child: ResourceClassId,
        added: bool,
    },
    PermissionAssociationChange {
        resource_class: ResourceClassId,
        permission: PermissionId,
        added: bool,
    },
    SubjectChange {
        subject: SubjectId,
    },
    RoleChange {
        role: RoleId,
    },
    PermissionChange {
        permission: PermissionId,
    },
    RoleImplicationChange {
        super_role: RoleId,
        sub_role: RoleId,
        added: bool,
    },
    RoleAssignmentChange {
        subject: SubjectId,
        role: RoleId,
        added: bool,
    },
    PermissionAssignmentChange {
        resource: ResourceId,
        role: RoleId,
        permission: PermissionId,
        added: bool,
    },
    ResourceCreation {
        resource: ResourceId,
        resource_class: ResourceClassId,
    },
    ResourceChange {
        resource: ResourceId,
        subject: SubjectId,
    },
    ResourceDeletion {
        resource: ResourceId,
        resource_class: ResourceClassId,
    },
    ResourceTreeChange {
        item: ResourceId,
        parent: ResourceId,
        added: bool,
    },
    ResourceOwnershipChange {
        resource: ResourceId,
        old_owner: SubjectId,
        new_owner: SubjectId,
    },
    ResourceTreeDeletion {
        root: ResourceId,
    },
}

/// The object a listener is attached to.
///
/// `Any` receives every event of a kind; the other variants receive only the
/// events that concern that entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Anchor {
    Any,
    Subject(SubjectId),
    Role(RoleId),
    Permission(PermissionId),
    Resource(ResourceId),
    ResourceClass(ResourceClassId),
    AttributeClass(AttributeClassId),
    AttributeDefinition(AttributeDefinitionId),
}

macro_rules! anchor_from {
    ($($id:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$id> for Anchor {
                fn from(id: $id) -> Self {
                    Anchor::$variant(id)
                }
            }
        )*
    };
}

anchor_from!(
    SubjectId => Subject,
    RoleId => Role,
    PermissionId => Permission,
    ResourceId => Resource,
    ResourceClassId => ResourceClass,
    AttributeClassId => AttributeClass,
    AttributeDefinitionId => AttributeDefinition,
);

impl CoralEvent {
    pub fn kind(&self) -> EventKind {
        EventKind::from(self)
    }

    /// Every entity this event concerns, without duplicates and never `Any`.
    pub fn anchors(&self) -> Vec<Anchor> {
        use CoralEvent::*;

        let mut anchors: Vec<Anchor> = match *self {
            AttributeClassChange { attribute_class } => vec![attribute_class.into()],
            AttributeDefinitionChange {
                attribute,
                resource_class,
            } => vec![attribute.into(), resource_class.into()],
            ResourceClassChange { resource_class } => vec![resource_class.into()],
            ResourceClassAttributesChange {
                resource_class,
                attribute,
                ..
            } => vec![resource_class.into(), attribute.into()],
            ResourceClassInheritanceChange { parent, child, .. } => {
                vec![parent.into(), child.into()]
            }
            PermissionAssociationChange {
                resource_class,
                permission,
                ..
            } => vec![resource_class.into(), permission.into()],
            SubjectChange { subject } => vec![subject.into()],
            RoleChange { role } => vec![role.into()],
            PermissionChange { permission } => vec![permission.into()],
            RoleImplicationChange {
                super_role,
                sub_role,
                ..
            } => vec![super_role.into(), sub_role.into()],
            RoleAssignmentChange { subject, role, .. } => vec![subject.into(), role.into()],
            PermissionAssignmentChange {
                resource,
                role,
                permission,
                ..
            } => vec![resource.into(), role.into(), permission.into()],
            ResourceCreation { resource_class, .. } => vec![resource_class.into()],
            ResourceChange { resource, .. } => vec![resource.into()],
            ResourceDeletion {
                resource,
                resource_class,
            } => vec![resource.into(), resource_class.into()],
            ResourceTreeChange { item, parent, .. } => vec![item.into(), parent.into()],
            ResourceOwnershipChange {
                resource,
                old_owner,
                new_owner,
            } => vec![resource.into(), old_owner.into(), new_owner.into()],
            ResourceTreeDeletion { root } => vec![root.into()],
        };

        let mut seen = Vec::with_capacity(anchors.len());
        anchors.retain(|anchor| {
            if seen.contains(anchor) {
                false
            } else {
                seen.push(*anchor);
                true
            }
        });
        anchors
    }
}
