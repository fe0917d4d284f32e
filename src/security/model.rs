//! Security records: principals, roles, permissions and the join records
//! connecting them.

use std::hash::{Hash, Hasher};

use crate::entity::{PermissionId, ResourceClassId, ResourceId, RoleId, SubjectId};
use crate::error::EntityKind;
use crate::traits::{CoralRecord, Entity};
use crate::utils::CoralDateTime;

macro_rules! named_entity {
    ($(#[$meta:meta])* $name:ident, $id:ident, $tree:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
        pub struct $name {
            id: $id,
            name: String,
        }

        impl $name {
            pub fn new(id: $id, name: impl Into<String>) -> Self {
                Self {
                    id,
                    name: name.into(),
                }
            }

            pub fn id(&self) -> $id {
                self.id
            }

            pub fn name(&self) -> &str {
                &self.name
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.id.hash(state);
            }
        }

        impl CoralRecord for $name {
            const TREE: &'static str = $tree;
            type Key = $id;

            fn record_key(&self) -> $id {
                self.id
            }
        }

        impl Entity for $name {
            type Id = $id;
            const KIND: EntityKind = EntityKind::$name;

            fn id(&self) -> $id {
                self.id
            }

            fn name(&self) -> &str {
                &self.name
            }

            fn set_name(&mut self, name: String) {
                self.name = name;
            }
        }
    };
}

named_entity!(
    /// A security principal. Sessions act on behalf of exactly one subject.
    Subject,
    SubjectId,
    "subjects"
);
named_entity!(
    /// A named bundle of permissions that can be granted to subjects.
    Role,
    RoleId,
    "roles"
);
named_entity!(
    /// A capability that roles hold on resources.
    Permission,
    PermissionId,
    "permissions"
);

/// Holding `super_role` implies holding `sub_role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, bincode::Encode, bincode::Decode)]
pub struct RoleImplication {
    pub super_role: RoleId,
    pub sub_role: RoleId,
}

impl CoralRecord for RoleImplication {
    const TREE: &'static str = "role_implications";
    type Key = (RoleId, RoleId);

    fn record_key(&self) -> Self::Key {
        (self.super_role, self.sub_role)
    }
}

/// A role granted to a subject.
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct RoleAssignment {
    pub subject: SubjectId,
    pub role: RoleId,
    pub grantor: SubjectId,
    /// Whether the subject may pass the role on to others
    pub granting_allowed: bool,
    #[bincode(with_serde)]
    pub grant_time: CoralDateTime,
}

impl CoralRecord for RoleAssignment {
    const TREE: &'static str = "role_assignments";
    type Key = (SubjectId, RoleId);

    fn record_key(&self) -> Self::Key {
        (self.subject, self.role)
    }
}

/// A permission made applicable to the resources of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, bincode::Encode, bincode::Decode)]
pub struct PermissionAssociation {
    pub resource_class: ResourceClassId,
    pub permission: PermissionId,
}

impl CoralRecord for PermissionAssociation {
    const TREE: &'static str = "permission_associations";
    type Key = (ResourceClassId, PermissionId);

    fn record_key(&self) -> Self::Key {
        (self.resource_class, self.permission)
    }
}

/// A permission held by a role on a resource, optionally covering the
/// resource's descendants.
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct PermissionAssignment {
    pub resource: ResourceId,
    pub role: RoleId,
    pub permission: PermissionId,
    /// Whether the grant applies to the whole subtree below `resource`
    pub inherited: bool,
    pub grantor: SubjectId,
    #[bincode(with_serde)]
    pub grant_time: CoralDateTime,
}

impl CoralRecord for PermissionAssignment {
    const TREE: &'static str = "permission_assignments";
    type Key = (ResourceId, RoleId, PermissionId);

    fn record_key(&self) -> Self::Key {
        (self.resource, self.role, self.permission)
    }
}
