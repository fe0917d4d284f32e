use std::collections::BTreeSet;

use super::model::{
    Permission, PermissionAssignment, Role, RoleAssignment, RoleImplication, Subject,
};
use crate::entity::{PermissionId, ResourceId, RoleId, SubjectId};
use crate::error::{CoralError, CoralResult, EntityKind};
use crate::event::CoralEvent;
use crate::schema::AttributeValue;
use crate::session::CoralSession;
use crate::state::CoralState;
use crate::traits::CoralRecord;
use crate::utils::datetime::now;

fn check_name(kind: EntityKind, name: &str) -> CoralResult<()> {
    if name.trim().is_empty() {
        return Err(CoralError::InvalidArgument(format!(
            "{kind} names must not be empty"
        )));
    }
    Ok(())
}

impl CoralState {
    fn require_not_builtin_subject(&self, id: SubjectId) -> CoralResult<()> {
        if id == self.builtins.root_subject || id == self.builtins.anonymous_subject {
            return Err(CoralError::Security(format!(
                "built-in subject {id} cannot be changed"
            )));
        }
        Ok(())
    }

    /// Superusers may grant anything; others only roles they hold with
    /// granting allowed.
    fn require_role_grantor(&self, grantor: SubjectId, role: RoleId) -> CoralResult<()> {
        if self.is_superuser(grantor) || self.security.can_grant(grantor, role) {
            return Ok(());
        }
        Err(CoralError::Security(format!(
            "subject {grantor} may not grant or revoke role {role}"
        )))
    }

    pub(crate) fn require_resource_authority(
        &self,
        subject: SubjectId,
        resource: ResourceId,
    ) -> CoralResult<()> {
        let owner = self.store.get(resource)?.owner;
        if owner == subject || self.is_superuser(subject) {
            return Ok(());
        }
        Err(CoralError::Security(format!(
            "subject {subject} is neither owner of resource {resource} nor a superuser"
        )))
    }

    pub(crate) fn create_subject(&mut self, subject: SubjectId, name: &str) -> CoralResult<Subject> {
        self.require_superuser(subject, "create subjects")?;
        check_name(EntityKind::Subject, name)?;
        if self.security.subjects.contains_name(name) {
            return Err(CoralError::exists(EntityKind::Subject, name));
        }
        let created = Subject::new(SubjectId(self.next_id()?), name);
        self.security.subjects.insert(created.clone())?;
        log::debug!("created subject {}", created.name());
        self.emit(CoralEvent::SubjectChange {
            subject: created.id(),
        });
        Ok(created)
    }

    pub(crate) fn rename_subject(
        &mut self,
        subject: SubjectId,
        id: SubjectId,
        name: &str,
    ) -> CoralResult<Subject> {
        self.require_superuser(subject, "rename subjects")?;
        self.require_not_builtin_subject(id)?;
        check_name(EntityKind::Subject, name)?;
        let renamed = self.security.subjects.rename(id, name)?;
        self.emit(CoralEvent::SubjectChange { subject: id });
        Ok(renamed)
    }

    /// Fails with `EntityInUse` while anything but the subject's own role
    /// assignments refers to it.
    fn require_unreferenced_subject(&self, id: SubjectId, name: &str) -> CoralResult<()> {
        let in_use = |reason: String| -> CoralResult<()> {
            Err(CoralError::in_use(EntityKind::Subject, name, reason))
        };
        for resource in self.store.iter() {
            if resource.owner == id {
                return in_use(format!("it owns resource {}", resource.id));
            }
            if resource.created_by == id || resource.modified_by == id {
                return in_use(format!("it is recorded as editor of resource {}", resource.id));
            }
        }
        if let Some(grant) = self
            .security
            .role_assignments
            .iter()
            .find(|a| a.grantor == id && a.subject != id)
        {
            return in_use(format!("it granted role {} to {}", grant.role, grant.subject));
        }
        if let Some(grant) = self
            .security
            .permission_assignments
            .iter()
            .find(|a| a.grantor == id)
        {
            return in_use(format!(
                "it granted permission {} on resource {}",
                grant.permission, grant.resource
            ));
        }
        self.require_no_value_references(EntityKind::Subject, name, |value| {
            *value == AttributeValue::Subject(id)
        })
    }

    /// Delete a subject nothing refers to, revoking its roles.
    pub(crate) fn delete_subject(&mut self, subject: SubjectId, id: SubjectId) -> CoralResult<()> {
        self.require_superuser(subject, "delete subjects")?;
        self.require_not_builtin_subject(id)?;
        let name = self.security.subjects.get(id)?.name().to_owned();
        self.require_unreferenced_subject(id, &name)?;
        let revoked = self
            .security
            .role_assignments
            .remove_where(|a| a.subject == id)?;
        self.security.subjects.remove(id)?;
        log::debug!("deleted subject {name}");
        for assignment in revoked {
            self.emit(CoralEvent::RoleAssignmentChange {
                subject: id,
                role: assignment.role,
                added: false,
            });
        }
        self.emit(CoralEvent::SubjectChange { subject: id });
        Ok(())
    }

    pub(crate) fn create_role(&mut self, subject: SubjectId, name: &str) -> CoralResult<Role> {
        self.require_superuser(subject, "create roles")?;
        check_name(EntityKind::Role, name)?;
        if self.security.roles.contains_name(name) {
            return Err(CoralError::exists(EntityKind::Role, name));
        }
        let role = Role::new(RoleId(self.next_id()?), name);
        self.security.roles.insert(role.clone())?;
        log::debug!("created role {}", role.name());
        self.emit(CoralEvent::RoleChange { role: role.id() });
        Ok(role)
    }

    pub(crate) fn rename_role(
        &mut self,
        subject: SubjectId,
        id: RoleId,
        name: &str,
    ) -> CoralResult<Role> {
        self.require_superuser(subject, "rename roles")?;
        if id == self.builtins.root_role {
            return Err(CoralError::Security("the root role cannot be renamed".into()));
        }
        check_name(EntityKind::Role, name)?;
        let role = self.security.roles.rename(id, name)?;
        self.emit(CoralEvent::RoleChange { role: id });
        Ok(role)
    }

    /// Delete a role nobody holds, dropping the implications it takes part in.
    pub(crate) fn delete_role(&mut self, subject: SubjectId, id: RoleId) -> CoralResult<()> {
        self.require_superuser(subject, "delete roles")?;
        if id == self.builtins.root_role {
            return Err(CoralError::Security("the root role cannot be deleted".into()));
        }
        let name = self.security.roles.get(id)?.name().to_owned();
        if self.security.role_assignments.any(|a| a.role == id) {
            return Err(CoralError::in_use(
                EntityKind::Role,
                name,
                "it is assigned to subjects",
            ));
        }
        if self.security.permission_assignments.any(|a| a.role == id) {
            return Err(CoralError::in_use(
                EntityKind::Role,
                name,
                "it holds permissions on resources",
            ));
        }
        self.require_no_value_references(EntityKind::Role, &name, |value| {
            *value == AttributeValue::Role(id)
        })?;
        let dropped = self
            .security
            .implications
            .remove_where(|i| i.super_role == id || i.sub_role == id)?;
        self.security.roles.remove(id)?;
        log::debug!("deleted role {name}");
        for implication in dropped {
            self.emit(CoralEvent::RoleImplicationChange {
                super_role: implication.super_role,
                sub_role: implication.sub_role,
                added: false,
            });
        }
        self.emit(CoralEvent::RoleChange { role: id });
        Ok(())
    }

    pub(crate) fn create_permission(
        &mut self,
        subject: SubjectId,
        name: &str,
    ) -> CoralResult<Permission> {
        self.require_superuser(subject, "create permissions")?;
        check_name(EntityKind::Permission, name)?;
        if self.security.permissions.contains_name(name) {
            return Err(CoralError::exists(EntityKind::Permission, name));
        }
        let permission = Permission::new(PermissionId(self.next_id()?), name);
        self.security.permissions.insert(permission.clone())?;
        log::debug!("created permission {}", permission.name());
        self.emit(CoralEvent::PermissionChange {
            permission: permission.id(),
        });
        Ok(permission)
    }

    pub(crate) fn rename_permission(
        &mut self,
        subject: SubjectId,
        id: PermissionId,
        name: &str,
    ) -> CoralResult<Permission> {
        self.require_superuser(subject, "rename permissions")?;
        check_name(EntityKind::Permission, name)?;
        let permission = self.security.permissions.rename(id, name)?;
        self.emit(CoralEvent::PermissionChange { permission: id });
        Ok(permission)
    }

    pub(crate) fn delete_permission(
        &mut self,
        subject: SubjectId,
        id: PermissionId,
    ) -> CoralResult<()> {
        self.require_superuser(subject, "delete permissions")?;
        let name = self.security.permissions.get(id)?.name().to_owned();
        if self.schema.associations.any(|a| a.permission == id) {
            return Err(CoralError::in_use(
                EntityKind::Permission,
                name,
                "it is associated with resource classes",
            ));
        }
        if self.security.permission_assignments.any(|a| a.permission == id) {
            return Err(CoralError::in_use(
                EntityKind::Permission,
                name,
                "it is assigned on resources",
            ));
        }
        self.require_no_value_references(EntityKind::Permission, &name, |value| {
            *value == AttributeValue::Permission(id)
        })?;
        self.security.permissions.remove(id)?;
        self.emit(CoralEvent::PermissionChange { permission: id });
        Ok(())
    }

    pub(crate) fn add_sub_role(
        &mut self,
        subject: SubjectId,
        super_role: RoleId,
        sub_role: RoleId,
    ) -> CoralResult<()> {
        self.require_superuser(subject, "change role implications")?;
        let super_name = self.security.roles.get(super_role)?.name();
        let sub_name = self.security.roles.get(sub_role)?.name();
        if super_role == sub_role || self.security.implies(sub_role, super_role) {
            return Err(CoralError::CircularDependency(format!(
                "{sub_name} already implies {super_name}"
            )));
        }
        let implication = RoleImplication {
            super_role,
            sub_role,
        };
        if self.security.implications.contains(&implication.record_key()) {
            return Err(CoralError::exists(
                EntityKind::RoleImplication,
                format!("{super_name} -> {sub_name}"),
            ));
        }
        self.security.implications.insert(implication)?;
        self.emit(CoralEvent::RoleImplicationChange {
            super_role,
            sub_role,
            added: true,
        });
        Ok(())
    }

    pub(crate) fn delete_sub_role(
        &mut self,
        subject: SubjectId,
        super_role: RoleId,
        sub_role: RoleId,
    ) -> CoralResult<()> {
        self.require_superuser(subject, "change role implications")?;
        if self
            .security
            .implications
            .remove(&(super_role, sub_role))?
            .is_none()
        {
            return Err(CoralError::missing(
                EntityKind::RoleImplication,
                format!("{super_role} -> {sub_role}"),
            ));
        }
        self.emit(CoralEvent::RoleImplicationChange {
            super_role,
            sub_role,
            added: false,
        });
        Ok(())
    }

    pub(crate) fn grant_role(
        &mut self,
        grantor: SubjectId,
        role: RoleId,
        subject: SubjectId,
        granting_allowed: bool,
    ) -> CoralResult<RoleAssignment> {
        let role_name = self.security.roles.get(role)?.name();
        let subject_name = self.security.subjects.get(subject)?.name();
        self.require_role_grantor(grantor, role)?;
        if self.security.role_assignments.contains(&(subject, role)) {
            return Err(CoralError::exists(
                EntityKind::RoleAssignment,
                format!("{role_name} for {subject_name}"),
            ));
        }
        let assignment = RoleAssignment {
            subject,
            role,
            grantor,
            granting_allowed,
            grant_time: now(),
        };
        log::debug!("granting role {role_name} to {subject_name}");
        self.security.role_assignments.insert(assignment.clone())?;
        self.emit(CoralEvent::RoleAssignmentChange {
            subject,
            role,
            added: true,
        });
        Ok(assignment)
    }

    pub(crate) fn revoke_role(
        &mut self,
        grantor: SubjectId,
        role: RoleId,
        subject: SubjectId,
    ) -> CoralResult<()> {
        self.require_role_grantor(grantor, role)?;
        if subject == self.builtins.root_subject && role == self.builtins.root_role {
            return Err(CoralError::Security(
                "the root role cannot be revoked from the root subject".into(),
            ));
        }
        if self
            .security
            .role_assignments
            .remove(&(subject, role))?
            .is_none()
        {
            return Err(CoralError::missing(
                EntityKind::RoleAssignment,
                format!("{role} for {subject}"),
            ));
        }
        log::debug!("revoked role {role} from {subject}");
        self.emit(CoralEvent::RoleAssignmentChange {
            subject,
            role,
            added: false,
        });
        Ok(())
    }

    pub(crate) fn grant_permission(
        &mut self,
        grantor: SubjectId,
        resource: ResourceId,
        role: RoleId,
        permission: PermissionId,
        inherited: bool,
    ) -> CoralResult<PermissionAssignment> {
        let class = self.store.get(resource)?.resource_class;
        self.security.roles.get(role)?;
        let permission_name = self.security.permissions.get(permission)?.name();
        self.require_resource_authority(grantor, resource)?;
        if !self.schema.class_permissions(class).contains(&permission) {
            let class_name = &self.schema.resource_classes.get(class)?.name;
            return Err(CoralError::InvalidArgument(format!(
                "permission {permission_name} is not associated with class {class_name}"
            )));
        }
        let assignment = PermissionAssignment {
            resource,
            role,
            permission,
            inherited,
            grantor,
            grant_time: now(),
        };
        if self.security.permission_assignments.contains(&assignment.record_key()) {
            return Err(CoralError::exists(
                EntityKind::PermissionAssignment,
                format!("{permission_name} for role {role} on {resource}"),
            ));
        }
        self.security
            .permission_assignments
            .insert(assignment.clone())?;
        self.emit(CoralEvent::PermissionAssignmentChange {
            resource,
            role,
            permission,
            added: true,
        });
        Ok(assignment)
    }

    pub(crate) fn revoke_permission(
        &mut self,
        grantor: SubjectId,
        resource: ResourceId,
        role: RoleId,
        permission: PermissionId,
    ) -> CoralResult<()> {
        self.require_resource_authority(grantor, resource)?;
        if self
            .security
            .permission_assignments
            .remove(&(resource, role, permission))?
            .is_none()
        {
            return Err(CoralError::missing(
                EntityKind::PermissionAssignment,
                format!("{permission} for role {role} on {resource}"),
            ));
        }
        self.emit(CoralEvent::PermissionAssignmentChange {
            resource,
            role,
            permission,
            added: false,
        });
        Ok(())
    }

    /// Whether `subject` holds `permission` on `resource`.
    ///
    /// Superusers hold everything. Otherwise one of the subject's roles, direct
    /// or implied, must hold the permission on the resource itself or, with
    /// `inherited` set, on one of its ancestors.
    pub(crate) fn has_permission(
        &self,
        subject: SubjectId,
        resource: ResourceId,
        permission: PermissionId,
    ) -> CoralResult<bool> {
        self.security.subjects.get(subject)?;
        self.security.permissions.get(permission)?;
        self.store.get(resource)?;
        if self.is_superuser(subject) {
            return Ok(true);
        }
        let roles = self.security.effective_roles(subject);
        let held = |on: ResourceId, inherited_only: bool| {
            self.security.permission_assignments.any(|a| {
                a.resource == on
                    && a.permission == permission
                    && roles.contains(&a.role)
                    && (a.inherited || !inherited_only)
            })
        };
        Ok(held(resource, false)
            || self
                .store
                .ancestors(resource)
                .into_iter()
                .any(|ancestor| held(ancestor, true)))
    }
}

/// Security access for one session.
///
/// Grants are made in the name of the session's subject.
pub struct CoralSecurity<'a> {
    session: &'a CoralSession,
}

impl<'a> CoralSecurity<'a> {
    pub(crate) fn new(session: &'a CoralSession) -> Self {
        Self { session }
    }

    pub fn create_subject(&self, name: &str) -> CoralResult<Subject> {
        self.session
            .mutate(|state, subject| state.create_subject(subject, name))
    }

    pub fn subject(&self, id: SubjectId) -> CoralResult<Subject> {
        self.session
            .read(|state, _| state.security.subjects.get(id).cloned())
    }

    pub fn subject_by_name(&self, name: &str) -> CoralResult<Subject> {
        self.session
            .read(|state, _| state.security.subjects.get_by_name(name).cloned())
    }

    pub fn subjects(&self) -> CoralResult<Vec<Subject>> {
        self.session.read(|state, _| Ok(state.security.subjects.sorted()))
    }

    pub fn root_subject(&self) -> CoralResult<Subject> {
        self.session.read(|state, _| {
            state
                .security
                .subjects
                .get(state.builtins.root_subject)
                .cloned()
        })
    }

    pub fn anonymous_subject(&self) -> CoralResult<Subject> {
        self.session.read(|state, _| {
            state
                .security
                .subjects
                .get(state.builtins.anonymous_subject)
                .cloned()
        })
    }

    pub fn rename_subject(&self, id: SubjectId, name: &str) -> CoralResult<Subject> {
        self.session
            .mutate(|state, subject| state.rename_subject(subject, id, name))
    }

    pub fn delete_subject(&self, id: SubjectId) -> CoralResult<()> {
        self.session
            .mutate(|state, subject| state.delete_subject(subject, id))
    }

    pub fn create_role(&self, name: &str) -> CoralResult<Role> {
        self.session
            .mutate(|state, subject| state.create_role(subject, name))
    }

    pub fn role(&self, id: RoleId) -> CoralResult<Role> {
        self.session
            .read(|state, _| state.security.roles.get(id).cloned())
    }

    pub fn role_by_name(&self, name: &str) -> CoralResult<Role> {
        self.session
            .read(|state, _| state.security.roles.get_by_name(name).cloned())
    }

    pub fn roles(&self) -> CoralResult<Vec<Role>> {
        self.session.read(|state, _| Ok(state.security.roles.sorted()))
    }

    pub fn root_role(&self) -> CoralResult<Role> {
        self.session
            .read(|state, _| state.security.roles.get(state.builtins.root_role).cloned())
    }

    pub fn rename_role(&self, id: RoleId, name: &str) -> CoralResult<Role> {
        self.session
            .mutate(|state, subject| state.rename_role(subject, id, name))
    }

    pub fn delete_role(&self, id: RoleId) -> CoralResult<()> {
        self.session
            .mutate(|state, subject| state.delete_role(subject, id))
    }

    pub fn create_permission(&self, name: &str) -> CoralResult<Permission> {
        self.session
            .mutate(|state, subject| state.create_permission(subject, name))
    }

    pub fn permission(&self, id: PermissionId) -> CoralResult<Permission> {
        self.session
            .read(|state, _| state.security.permissions.get(id).cloned())
    }

    pub fn permission_by_name(&self, name: &str) -> CoralResult<Permission> {
        self.session
            .read(|state, _| state.security.permissions.get_by_name(name).cloned())
    }

    pub fn permissions(&self) -> CoralResult<Vec<Permission>> {
        self.session
            .read(|state, _| Ok(state.security.permissions.sorted()))
    }

    pub fn rename_permission(&self, id: PermissionId, name: &str) -> CoralResult<Permission> {
        self.session
            .mutate(|state, subject| state.rename_permission(subject, id, name))
    }

    pub fn delete_permission(&self, id: PermissionId) -> CoralResult<()> {
        self.session
            .mutate(|state, subject| state.delete_permission(subject, id))
    }

    /// Make holders of `super_role` implicitly hold `sub_role`
    pub fn add_sub_role(&self, super_role: RoleId, sub_role: RoleId) -> CoralResult<()> {
        self.session
            .mutate(|state, subject| state.add_sub_role(subject, super_role, sub_role))
    }

    pub fn delete_sub_role(&self, super_role: RoleId, sub_role: RoleId) -> CoralResult<()> {
        self.session
            .mutate(|state, subject| state.delete_sub_role(subject, super_role, sub_role))
    }

    /// Roles directly implied by `role`
    pub fn sub_roles(&self, role: RoleId) -> CoralResult<Vec<Role>> {
        self.session.read(|state, _| {
            state.security.roles.get(role)?;
            state
                .security
                .sub_roles(role)
                .into_iter()
                .map(|id| state.security.roles.get(id).cloned())
                .collect()
        })
    }

    /// Roles directly implying `role`
    pub fn super_roles(&self, role: RoleId) -> CoralResult<Vec<Role>> {
        self.session.read(|state, _| {
            state.security.roles.get(role)?;
            state
                .security
                .super_roles(role)
                .into_iter()
                .map(|id| state.security.roles.get(id).cloned())
                .collect()
        })
    }

    /// `role` and every role it implies, transitively
    pub fn implied_roles(&self, role: RoleId) -> CoralResult<BTreeSet<RoleId>> {
        self.session.read(|state, _| {
            state.security.roles.get(role)?;
            Ok(state.security.implied_roles(role))
        })
    }

    /// Grant `role` to `subject` in the name of the session's subject.
    pub fn grant_role(
        &self,
        role: RoleId,
        subject: SubjectId,
        granting_allowed: bool,
    ) -> CoralResult<RoleAssignment> {
        self.session.mutate(|state, grantor| {
            state.grant_role(grantor, role, subject, granting_allowed)
        })
    }

    pub fn revoke_role(&self, role: RoleId, subject: SubjectId) -> CoralResult<()> {
        self.session
            .mutate(|state, grantor| state.revoke_role(grantor, role, subject))
    }

    /// Roles assigned directly to `subject`
    pub fn roles_of(&self, subject: SubjectId) -> CoralResult<Vec<Role>> {
        self.session.read(|state, _| {
            state.security.subjects.get(subject)?;
            state
                .security
                .assigned_roles(subject)
                .into_iter()
                .map(|a| state.security.roles.get(a.role).cloned())
                .collect()
        })
    }

    pub fn role_assignments(&self, subject: SubjectId) -> CoralResult<Vec<RoleAssignment>> {
        self.session.read(|state, _| {
            state.security.subjects.get(subject)?;
            Ok(state
                .security
                .assigned_roles(subject)
                .into_iter()
                .cloned()
                .collect())
        })
    }

    /// Whether `subject` holds `role`, directly or through implication
    pub fn has_role(&self, subject: SubjectId, role: RoleId) -> CoralResult<bool> {
        self.session.read(|state, _| {
            state.security.subjects.get(subject)?;
            state.security.roles.get(role)?;
            Ok(state.security.effective_roles(subject).contains(&role))
        })
    }

    pub fn is_superuser(&self, subject: SubjectId) -> CoralResult<bool> {
        self.session.read(|state, _| {
            state.security.subjects.get(subject)?;
            Ok(state.is_superuser(subject))
        })
    }

    pub fn grant_permission(
        &self,
        resource: ResourceId,
        role: RoleId,
        permission: PermissionId,
        inherited: bool,
    ) -> CoralResult<PermissionAssignment> {
        self.session.mutate(|state, grantor| {
            state.grant_permission(grantor, resource, role, permission, inherited)
        })
    }

    pub fn revoke_permission(
        &self,
        resource: ResourceId,
        role: RoleId,
        permission: PermissionId,
    ) -> CoralResult<()> {
        self.session.mutate(|state, grantor| {
            state.revoke_permission(grantor, resource, role, permission)
        })
    }

    /// Permission grants made directly on `resource`
    pub fn permission_assignments(
        &self,
        resource: ResourceId,
    ) -> CoralResult<Vec<PermissionAssignment>> {
        self.session.read(|state, _| {
            state.store.get(resource)?;
            Ok(state
                .security
                .permission_assignments
                .iter()
                .filter(|a| a.resource == resource)
                .cloned()
                .collect())
        })
    }

    pub fn has_permission(
        &self,
        subject: SubjectId,
        resource: ResourceId,
        permission: PermissionId,
    ) -> CoralResult<bool> {
        self.session
            .read(|state, _| state.has_permission(subject, resource, permission))
    }

    /// Whether the session's own subject holds `permission` on `resource`
    pub fn check_permission(
        &self,
        resource: ResourceId,
        permission: PermissionId,
    ) -> CoralResult<bool> {
        self.session
            .read(|state, subject| state.has_permission(subject, resource, permission))
    }
}
