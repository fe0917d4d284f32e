use std::collections::{BTreeSet, VecDeque};

use super::model::{
    Permission, PermissionAssignment, Role, RoleAssignment, RoleImplication, Subject,
};
use crate::databases::SledStore;
use crate::entity::{EntityRegistry, RecordSet, RoleId, SubjectId};
use crate::error::CoralResult;

/// Cached security records and role closure queries.
pub(crate) struct SecurityState {
    pub subjects: EntityRegistry<Subject>,
    pub roles: EntityRegistry<Role>,
    pub permissions: EntityRegistry<Permission>,
    pub implications: RecordSet<RoleImplication>,
    pub role_assignments: RecordSet<RoleAssignment>,
    pub permission_assignments: RecordSet<PermissionAssignment>,
}

impl SecurityState {
    pub fn load(db: &SledStore) -> CoralResult<Self> {
        Ok(Self {
            subjects: EntityRegistry::load(db.open_tree()?)?,
            roles: EntityRegistry::load(db.open_tree()?)?,
            permissions: EntityRegistry::load(db.open_tree()?)?,
            implications: RecordSet::load(db.open_tree()?)?,
            role_assignments: RecordSet::load(db.open_tree()?)?,
            permission_assignments: RecordSet::load(db.open_tree()?)?,
        })
    }

    pub fn commit(&mut self) -> CoralResult<()> {
        self.subjects.commit()?;
        self.roles.commit()?;
        self.permissions.commit()?;
        self.implications.commit()?;
        self.role_assignments.commit()?;
        self.permission_assignments.commit()
    }

    pub fn rollback(&mut self) {
        self.subjects.rollback();
        self.roles.rollback();
        self.permissions.rollback();
        self.implications.rollback();
        self.role_assignments.rollback();
        self.permission_assignments.rollback();
    }

    pub fn sub_roles(&self, role: RoleId) -> Vec<RoleId> {
        self.implications
            .iter()
            .filter(|i| i.super_role == role)
            .map(|i| i.sub_role)
            .collect()
    }

    pub fn super_roles(&self, role: RoleId) -> Vec<RoleId> {
        self.implications
            .iter()
            .filter(|i| i.sub_role == role)
            .map(|i| i.super_role)
            .collect()
    }

    /// `role` and every role it implies, transitively
    pub fn implied_roles(&self, role: RoleId) -> BTreeSet<RoleId> {
        let mut seen = BTreeSet::from([role]);
        let mut queue = VecDeque::from([role]);
        while let Some(current) = queue.pop_front() {
            for sub in self.sub_roles(current) {
                if seen.insert(sub) {
                    queue.push_back(sub);
                }
            }
        }
        seen
    }

    pub fn implies(&self, role: RoleId, other: RoleId) -> bool {
        self.implied_roles(role).contains(&other)
    }

    /// Roles assigned directly to `subject`
    pub fn assigned_roles(&self, subject: SubjectId) -> Vec<&RoleAssignment> {
        self.role_assignments
            .iter()
            .filter(|a| a.subject == subject)
            .collect()
    }

    /// Every role `subject` holds, directly or through implication
    pub fn effective_roles(&self, subject: SubjectId) -> BTreeSet<RoleId> {
        self.assigned_roles(subject)
            .into_iter()
            .flat_map(|a| self.implied_roles(a.role))
            .collect()
    }

    /// Whether `subject` holds `role` through an assignment that allows granting
    pub fn can_grant(&self, subject: SubjectId, role: RoleId) -> bool {
        self.assigned_roles(subject)
            .into_iter()
            .filter(|a| a.granting_allowed)
            .any(|a| self.implies(a.role, role))
    }
}
