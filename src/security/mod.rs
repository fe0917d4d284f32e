//! Subjects, roles and permissions.
//!
//! Roles form an implication graph: holding a role means holding every role
//! it implies. Permissions are made applicable to resource classes by
//! association, then granted to roles on individual resources.

pub mod manager;
pub mod model;
pub(crate) mod state;

pub use manager::CoralSecurity;
pub use model::{
    Permission, PermissionAssignment, PermissionAssociation, Role, RoleAssignment,
    RoleImplication, Subject,
};
