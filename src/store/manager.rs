use std::collections::{BTreeMap, BTreeSet};

use super::model::Resource;
use crate::entity::{AttributeDefinitionId, ResourceClassId, ResourceId, SubjectId};
use crate::error::{CoralError, CoralResult, EntityKind};
use crate::event::CoralEvent;
use crate::schema::{AttributeDefinition, AttributeValue};
use crate::session::CoralSession;
use crate::state::CoralState;
use crate::utils::datetime::now;

/// Separator of resource paths
pub const PATH_SEPARATOR: char = '/';

fn check_resource_name(name: &str) -> CoralResult<()> {
    if name.is_empty() {
        return Err(CoralError::InvalidArgument(
            "resource names must not be empty".into(),
        ));
    }
    if name.contains(PATH_SEPARATOR) {
        return Err(CoralError::InvalidArgument(format!(
            "resource name {name:?} contains '{PATH_SEPARATOR}'"
        )));
    }
    Ok(())
}

impl CoralState {
    fn require_not_root(&self, id: ResourceId, action: &str) -> CoralResult<()> {
        if id == self.builtins.root_resource {
            return Err(CoralError::Security(format!(
                "the root resource cannot be {action}"
            )));
        }
        Ok(())
    }

    /// The definition of `attribute` if resources of `class` can carry it
    fn visible_attribute(
        &self,
        class: ResourceClassId,
        attribute: AttributeDefinitionId,
    ) -> CoralResult<&AttributeDefinition> {
        let definition = self.schema.attribute(attribute)?;
        if !self.schema.is_subclass_of(class, definition.declaring_class) {
            let class_name = &self.schema.resource_classes.get(class)?.name;
            return Err(CoralError::InvalidArgument(format!(
                "attribute {} is not defined for class {class_name}",
                definition.name
            )));
        }
        Ok(definition)
    }

    /// Check a complete attribute map for a new resource of `class`.
    fn check_attributes(
        &self,
        class: ResourceClassId,
        attributes: &BTreeMap<AttributeDefinitionId, AttributeValue>,
    ) -> CoralResult<()> {
        for (attribute, value) in attributes {
            let definition = self.visible_attribute(class, *attribute)?;
            self.check_value(definition, value)?;
        }
        if let Some(missing) = self
            .schema
            .all_attributes(class)
            .into_iter()
            .find(|a| a.is_required() && !attributes.contains_key(&a.id))
        {
            return Err(CoralError::ValueRequired {
                attribute: missing.name.clone(),
                class: self.schema.resource_classes.get(class)?.name.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn create_resource(
        &mut self,
        subject: SubjectId,
        name: &str,
        parent: ResourceId,
        class: ResourceClassId,
        attributes: BTreeMap<AttributeDefinitionId, AttributeValue>,
    ) -> CoralResult<Resource> {
        check_resource_name(name)?;
        self.store.get(parent)?;
        let resource_class = self.schema.resource_classes.get(class)?;
        if resource_class.is_abstract() {
            return Err(CoralError::InvalidArgument(format!(
                "class {} is abstract",
                resource_class.name
            )));
        }
        self.check_attributes(class, &attributes)?;

        let created = now();
        let resource = Resource {
            id: ResourceId(self.next_id()?),
            name: name.to_owned(),
            resource_class: class,
            parent: Some(parent),
            owner: subject,
            created_by: subject,
            creation_time: created,
            modified_by: subject,
            modification_time: created,
            attributes,
        };
        self.store.insert(resource.clone())?;
        log::debug!("created resource {} ({}) under {parent}", resource.name, resource.id);
        self.emit(CoralEvent::ResourceCreation {
            resource: resource.id,
            resource_class: class,
        });
        self.emit(CoralEvent::ResourceTreeChange {
            item: resource.id,
            parent,
            added: true,
        });
        Ok(resource)
    }

    pub(crate) fn set_resource_name(
        &mut self,
        subject: SubjectId,
        id: ResourceId,
        name: &str,
    ) -> CoralResult<Resource> {
        self.require_not_root(id, "renamed")?;
        check_resource_name(name)?;
        let mut resource = self.store.get(id)?.clone();
        resource.name = name.to_owned();
        resource.touch(subject);
        self.store.save(resource.clone())?;
        self.emit(CoralEvent::ResourceChange {
            resource: id,
            subject,
        });
        Ok(resource)
    }

    pub(crate) fn set_resource_parent(
        &mut self,
        subject: SubjectId,
        id: ResourceId,
        parent: ResourceId,
    ) -> CoralResult<Resource> {
        self.require_not_root(id, "moved")?;
        self.store.get(parent)?;
        let mut resource = self.store.get(id)?.clone();
        if parent == id || self.store.is_ancestor(id, parent) {
            return Err(CoralError::CircularDependency(format!(
                "resource {id} cannot be moved below itself"
            )));
        }
        let old_parent = resource.parent;
        if old_parent == Some(parent) {
            return Ok(resource);
        }
        resource.parent = Some(parent);
        resource.touch(subject);
        self.store.save(resource.clone())?;
        if let Some(old_parent) = old_parent {
            self.emit(CoralEvent::ResourceTreeChange {
                item: id,
                parent: old_parent,
                added: false,
            });
        }
        self.emit(CoralEvent::ResourceTreeChange {
            item: id,
            parent,
            added: true,
        });
        self.emit(CoralEvent::ResourceChange {
            resource: id,
            subject,
        });
        Ok(resource)
    }

    pub(crate) fn set_resource_owner(
        &mut self,
        subject: SubjectId,
        id: ResourceId,
        owner: SubjectId,
    ) -> CoralResult<Resource> {
        self.security.subjects.get(owner)?;
        self.require_resource_authority(subject, id)?;
        let mut resource = self.store.get(id)?.clone();
        let old_owner = resource.owner;
        resource.owner = owner;
        resource.touch(subject);
        self.store.save(resource.clone())?;
        self.emit(CoralEvent::ResourceOwnershipChange {
            resource: id,
            old_owner,
            new_owner: owner,
        });
        Ok(resource)
    }

    pub(crate) fn set_resource_attribute(
        &mut self,
        subject: SubjectId,
        id: ResourceId,
        attribute: AttributeDefinitionId,
        value: AttributeValue,
    ) -> CoralResult<Resource> {
        let mut resource = self.store.get(id)?.clone();
        let definition = self.visible_attribute(resource.resource_class, attribute)?;
        if definition.is_readonly() {
            return Err(CoralError::Security(format!(
                "attribute {} is read-only",
                definition.name
            )));
        }
        self.check_value(definition, &value)?;
        resource.attributes.insert(attribute, value);
        resource.touch(subject);
        self.store.save(resource.clone())?;
        self.emit(CoralEvent::ResourceChange {
            resource: id,
            subject,
        });
        Ok(resource)
    }

    pub(crate) fn unset_resource_attribute(
        &mut self,
        subject: SubjectId,
        id: ResourceId,
        attribute: AttributeDefinitionId,
    ) -> CoralResult<Resource> {
        let mut resource = self.store.get(id)?.clone();
        let definition = self.visible_attribute(resource.resource_class, attribute)?;
        if definition.is_required() {
            return Err(CoralError::ValueRequired {
                attribute: definition.name.clone(),
                class: self
                    .schema
                    .resource_classes
                    .get(resource.resource_class)?
                    .name
                    .clone(),
            });
        }
        if definition.is_readonly() {
            return Err(CoralError::Security(format!(
                "attribute {} is read-only",
                definition.name
            )));
        }
        if resource.attributes.remove(&attribute).is_none() {
            return Ok(resource);
        }
        resource.touch(subject);
        self.store.save(resource.clone())?;
        self.emit(CoralEvent::ResourceChange {
            resource: id,
            subject,
        });
        Ok(resource)
    }

    /// Fails with `EntityInUse` if a resource outside `doomed` holds a
    /// reference value to a resource inside it.
    fn require_unreferenced_resources(&self, doomed: &BTreeSet<ResourceId>) -> CoralResult<()> {
        for resource in self.store.iter().filter(|r| !doomed.contains(&r.id)) {
            for value in resource.attributes.values() {
                if let AttributeValue::Resource(target) = value {
                    if doomed.contains(target) {
                        return Err(CoralError::in_use(
                            EntityKind::Resource,
                            &self.store.get(*target)?.name,
                            format!("resource {} refers to it", resource.id),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Fails with `EntityInUse` if any resource holds an attribute value
    /// matching `refers`.
    pub(crate) fn require_no_value_references(
        &self,
        kind: EntityKind,
        name: &str,
        refers: impl Fn(&AttributeValue) -> bool,
    ) -> CoralResult<()> {
        if let Some(user) = self
            .store
            .iter()
            .find(|r| r.attributes.values().any(&refers))
        {
            return Err(CoralError::in_use(
                kind,
                name,
                format!("resource {} refers to it", user.id),
            ));
        }
        Ok(())
    }

    /// Remove a leaf resource nothing refers to, and the permission grants
    /// made on it.
    pub(crate) fn delete_resource(&mut self, id: ResourceId) -> CoralResult<()> {
        self.require_not_root(id, "deleted")?;
        let resource = self.store.get(id)?;
        if self.store.has_children(id) {
            return Err(CoralError::in_use(
                EntityKind::Resource,
                &resource.name,
                "it has children",
            ));
        }
        self.require_unreferenced_resources(&BTreeSet::from([id]))?;
        self.remove_resource(id)
    }

    fn remove_resource(&mut self, id: ResourceId) -> CoralResult<()> {
        let revoked = self
            .security
            .permission_assignments
            .remove_where(|a| a.resource == id)?;
        let resource = self.store.remove(id)?;
        log::debug!("deleted resource {} ({id})", resource.name);
        for grant in revoked {
            self.emit(CoralEvent::PermissionAssignmentChange {
                resource: id,
                role: grant.role,
                permission: grant.permission,
                added: false,
            });
        }
        if let Some(parent) = resource.parent {
            self.emit(CoralEvent::ResourceTreeChange {
                item: id,
                parent,
                added: false,
            });
        }
        self.emit(CoralEvent::ResourceDeletion {
            resource: id,
            resource_class: resource.resource_class,
        });
        Ok(())
    }

    /// Delete `root` and everything below it, deepest resources first.
    ///
    /// References between resources inside the tree do not block deletion.
    pub(crate) fn delete_tree(&mut self, root: ResourceId) -> CoralResult<usize> {
        self.require_not_root(root, "deleted")?;
        self.store.get(root)?;
        let doomed = self.store.subtree(root);
        self.require_unreferenced_resources(&doomed.iter().copied().collect())?;
        for &id in &doomed {
            self.remove_resource(id)?;
        }
        self.emit(CoralEvent::ResourceTreeDeletion { root });
        Ok(doomed.len())
    }

    pub(crate) fn copy_resource(
        &mut self,
        subject: SubjectId,
        source: ResourceId,
        parent: ResourceId,
        name: &str,
    ) -> CoralResult<Resource> {
        let original = self.store.get(source)?;
        let class = original.resource_class;
        let attributes = original.attributes.clone();
        self.create_resource(subject, name, parent, class, attributes)
    }

    /// Copy `source` and its whole subtree below `parent`, naming the new
    /// root `name`. Returns the new root.
    pub(crate) fn copy_tree(
        &mut self,
        subject: SubjectId,
        source: ResourceId,
        parent: ResourceId,
        name: &str,
    ) -> CoralResult<Resource> {
        self.store.get(parent)?;
        if parent == source || self.store.is_ancestor(source, parent) {
            return Err(CoralError::CircularDependency(format!(
                "resource {source} cannot be copied below itself"
            )));
        }
        let copy = self.copy_resource(subject, source, parent, name)?;
        let mut pending = vec![(source, copy.id)];
        while let Some((from, to)) = pending.pop() {
            for child in self.store.children(from) {
                let child_name = self.store.get(child)?.name.clone();
                let copied = self.copy_resource(subject, child, to, &child_name)?;
                pending.push((child, copied.id));
            }
        }
        Ok(copy)
    }

    /// Absolute path of `id`, `/` for the root resource
    pub(crate) fn resource_path(&self, id: ResourceId) -> CoralResult<String> {
        let resource = self.store.get(id)?;
        let mut names = vec![resource.name.as_str()];
        for ancestor in self.store.ancestors(id) {
            names.push(self.store.get(ancestor)?.name.as_str());
        }
        // the root's own name is not part of any path
        names.pop();
        if names.is_empty() {
            return Ok(PATH_SEPARATOR.to_string());
        }
        names.reverse();
        Ok(names
            .into_iter()
            .flat_map(|name| [PATH_SEPARATOR.to_string(), name.to_owned()])
            .collect())
    }

    /// Every resource reachable along `path`. Siblings may share a name, so
    /// a path can match several resources.
    pub(crate) fn resources_by_path(&self, path: &str) -> CoralResult<Vec<ResourceId>> {
        if !path.starts_with(PATH_SEPARATOR) {
            return Err(CoralError::InvalidArgument(format!(
                "path {path:?} is not absolute"
            )));
        }
        let mut matches = vec![self.builtins.root_resource];
        for segment in path.split(PATH_SEPARATOR).filter(|s| !s.is_empty()) {
            let mut next = Vec::new();
            for &id in &matches {
                for child in self.store.children(id) {
                    if self.store.get(child)?.name == segment {
                        next.push(child);
                    }
                }
            }
            if next.is_empty() {
                return Ok(next);
            }
            matches = next;
        }
        Ok(matches)
    }
}

/// Resource tree access for one session.
pub struct CoralStore<'a> {
    session: &'a CoralSession,
}

impl<'a> CoralStore<'a> {
    pub(crate) fn new(session: &'a CoralSession) -> Self {
        Self { session }
    }

    /// Create a resource owned by the session's subject.
    ///
    /// `attributes` must supply every required attribute of `class`, inherited
    /// ones included.
    pub fn create_resource(
        &self,
        name: &str,
        parent: ResourceId,
        class: ResourceClassId,
        attributes: BTreeMap<AttributeDefinitionId, AttributeValue>,
    ) -> CoralResult<Resource> {
        self.session.mutate(|state, subject| {
            state.create_resource(subject, name, parent, class, attributes)
        })
    }

    pub fn resource(&self, id: ResourceId) -> CoralResult<Resource> {
        self.session.read(|state, _| state.store.get(id).cloned())
    }

    pub fn root_resource(&self) -> CoralResult<Resource> {
        self.session
            .read(|state, _| state.store.get(state.builtins.root_resource).cloned())
    }

    pub fn children(&self, id: ResourceId) -> CoralResult<Vec<Resource>> {
        self.session.read(|state, _| {
            state.store.get(id)?;
            state
                .store
                .children(id)
                .into_iter()
                .map(|child| state.store.get(child).cloned())
                .collect()
        })
    }

    /// Children of `parent` called `name`
    pub fn resources_by_name(&self, parent: ResourceId, name: &str) -> CoralResult<Vec<Resource>> {
        self.session.read(|state, _| {
            state.store.get(parent)?;
            let mut found = Vec::new();
            for child in state.store.children(parent) {
                let child = state.store.get(child)?;
                if child.name == name {
                    found.push(child.clone());
                }
            }
            Ok(found)
        })
    }

    /// Every resource called `name`, anywhere in the tree
    pub fn resources_named(&self, name: &str) -> CoralResult<Vec<Resource>> {
        self.session.read(|state, _| {
            Ok(state
                .store
                .iter()
                .filter(|r| r.name == name)
                .cloned()
                .collect())
        })
    }

    pub fn resources_by_path(&self, path: &str) -> CoralResult<Vec<Resource>> {
        self.session.read(|state, _| {
            state
                .resources_by_path(path)?
                .into_iter()
                .map(|id| state.store.get(id).cloned())
                .collect()
        })
    }

    /// The single resource at `path`.
    ///
    /// Fails with `EntityDoesNotExist` when nothing matches and with
    /// `InvalidArgument` when the path is ambiguous.
    pub fn unique_resource_by_path(&self, path: &str) -> CoralResult<Resource> {
        self.session.read(|state, _| {
            let found = state.resources_by_path(path)?;
            match found.as_slice() {
                [] => Err(CoralError::missing(EntityKind::Resource, path)),
                [id] => state.store.get(*id).cloned(),
                _ => Err(CoralError::InvalidArgument(format!(
                    "path {path:?} matches {} resources",
                    found.len()
                ))),
            }
        })
    }

    pub fn path(&self, id: ResourceId) -> CoralResult<String> {
        self.session.read(|state, _| state.resource_path(id))
    }

    /// Resources of `class`, and of its subclasses when `include_subclasses`
    pub fn resources_of_class(
        &self,
        class: ResourceClassId,
        include_subclasses: bool,
    ) -> CoralResult<Vec<Resource>> {
        self.session.read(|state, _| {
            state.schema.resource_classes.get(class)?;
            let classes: BTreeSet<ResourceClassId> = if include_subclasses {
                let mut classes = state.schema.descendants(class);
                classes.insert(class);
                classes
            } else {
                BTreeSet::from([class])
            };
            let mut found: Vec<Resource> = state
                .store
                .iter()
                .filter(|r| classes.contains(&r.resource_class))
                .cloned()
                .collect();
            found.sort_by_key(Resource::id);
            Ok(found)
        })
    }

    /// Value of the attribute called `name` on `id`, if set
    pub fn attribute_value(&self, id: ResourceId, name: &str) -> CoralResult<Option<AttributeValue>> {
        self.session.read(|state, _| {
            let resource = state.store.get(id)?;
            let definition = state
                .schema
                .find_attribute(resource.resource_class, name)
                .ok_or_else(|| CoralError::missing(EntityKind::AttributeDefinition, name))?;
            Ok(resource.get(definition.id).cloned())
        })
    }

    pub fn set_name(&self, id: ResourceId, name: &str) -> CoralResult<Resource> {
        self.session
            .mutate(|state, subject| state.set_resource_name(subject, id, name))
    }

    pub fn set_parent(&self, id: ResourceId, parent: ResourceId) -> CoralResult<Resource> {
        self.session
            .mutate(|state, subject| state.set_resource_parent(subject, id, parent))
    }

    /// Hand `id` to `owner`. Only the current owner or a superuser may do so.
    pub fn set_owner(&self, id: ResourceId, owner: SubjectId) -> CoralResult<Resource> {
        self.session
            .mutate(|state, subject| state.set_resource_owner(subject, id, owner))
    }

    pub fn set_attribute(
        &self,
        id: ResourceId,
        attribute: AttributeDefinitionId,
        value: AttributeValue,
    ) -> CoralResult<Resource> {
        self.session.mutate(|state, subject| {
            state.set_resource_attribute(subject, id, attribute, value)
        })
    }

    pub fn unset_attribute(
        &self,
        id: ResourceId,
        attribute: AttributeDefinitionId,
    ) -> CoralResult<Resource> {
        self.session
            .mutate(|state, subject| state.unset_resource_attribute(subject, id, attribute))
    }

    pub fn delete_resource(&self, id: ResourceId) -> CoralResult<()> {
        self.session.mutate(|state, _| state.delete_resource(id))
    }

    /// Delete `root` with its whole subtree, returning how many resources
    /// were removed.
    pub fn delete_tree(&self, root: ResourceId) -> CoralResult<usize> {
        self.session.mutate(|state, _| state.delete_tree(root))
    }

    /// Copy a single resource with its attribute values
    pub fn copy_resource(
        &self,
        source: ResourceId,
        parent: ResourceId,
        name: &str,
    ) -> CoralResult<Resource> {
        self.session
            .mutate(|state, subject| state.copy_resource(subject, source, parent, name))
    }

    pub fn copy_tree(
        &self,
        source: ResourceId,
        parent: ResourceId,
        name: &str,
    ) -> CoralResult<Resource> {
        self.session
            .mutate(|state, subject| state.copy_tree(subject, source, parent, name))
    }

    /// True when `ancestor` lies strictly above `descendant`
    pub fn is_ancestor(&self, ancestor: ResourceId, descendant: ResourceId) -> CoralResult<bool> {
        self.session.read(|state, _| {
            state.store.get(ancestor)?;
            state.store.get(descendant)?;
            Ok(state.store.is_ancestor(ancestor, descendant))
        })
    }
}
