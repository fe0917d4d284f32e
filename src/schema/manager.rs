use std::collections::{BTreeMap, BTreeSet};

use typed_builder::TypedBuilder;

use super::model::{
    AttributeClass, AttributeDefinition, AttributeFlags, AttributeType, AttributeValue,
    ResourceClass, ResourceClassFlags, ResourceClassInheritance,
};
use crate::entity::{
    AttributeClassId, AttributeDefinitionId, PermissionId, ResourceClassId, ResourceId, SubjectId,
};
use crate::error::{CoralError, CoralResult, EntityKind};
use crate::event::CoralEvent;
use crate::security::{Permission, PermissionAssociation};
use crate::session::CoralSession;
use crate::state::CoralState;
use crate::traits::CoralRecord;

/// Arguments for declaring a new attribute on a resource class.
///
/// ```
/// use coral::entity::AttributeClassId;
/// use coral::schema::{AttributeFlags, AttributeValue, NewAttribute};
///
/// let attribute = NewAttribute::builder()
///     .name("title")
///     .attribute_class(AttributeClassId(1))
///     .flags(AttributeFlags::REQUIRED)
///     .default(AttributeValue::String("untitled".into()))
///     .build();
/// assert!(attribute.domain.is_none());
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct NewAttribute {
    #[builder(setter(into))]
    pub name: String,
    pub attribute_class: AttributeClassId,
    #[builder(default)]
    pub flags: AttributeFlags,
    #[builder(default, setter(strip_option, into))]
    pub domain: Option<String>,
    /// Value written to existing instances. Needed for REQUIRED attributes of
    /// classes that already have instances.
    #[builder(default, setter(strip_option))]
    pub default: Option<AttributeValue>,
}

impl CoralState {
    /// Reject `value` unless it has the attribute's type and any entity it
    /// refers to exists.
    pub(crate) fn check_value(
        &self,
        attribute: &AttributeDefinition,
        value: &AttributeValue,
    ) -> CoralResult<()> {
        let expected = self.schema.attribute_type(attribute)?;
        if value.value_type() != expected {
            return Err(CoralError::InvalidArgument(format!(
                "attribute {} expects a {} value, got {}",
                attribute.name,
                expected,
                value.value_type()
            )));
        }
        match *value {
            AttributeValue::Resource(id) => self.store.get(id).map(drop),
            AttributeValue::Subject(id) => self.security.subjects.get(id).map(drop),
            AttributeValue::Role(id) => self.security.roles.get(id).map(drop),
            AttributeValue::Permission(id) => self.security.permissions.get(id).map(drop),
            _ => Ok(()),
        }
    }

    /// Resources whose class is one of `classes`
    fn instances_of(&self, classes: &BTreeSet<ResourceClassId>) -> Vec<ResourceId> {
        self.store
            .iter()
            .filter(|r| classes.contains(&r.resource_class))
            .map(|r| r.id)
            .collect()
    }

    /// `class` and all of its descendants
    fn class_subtree(&self, class: ResourceClassId) -> BTreeSet<ResourceClassId> {
        let mut classes = self.schema.descendants(class);
        classes.insert(class);
        classes
    }

    fn require_modifiable_class(&self, class: ResourceClassId) -> CoralResult<&ResourceClass> {
        let class = self.schema.resource_classes.get(class)?;
        if class.flags.contains(ResourceClassFlags::BUILTIN) {
            return Err(CoralError::Security(format!(
                "built-in resource class {} cannot be modified",
                class.name
            )));
        }
        Ok(class)
    }

    /// Fill `values` into every listed resource that lacks them.
    fn write_defaults(
        &mut self,
        resources: &[ResourceId],
        values: &BTreeMap<AttributeDefinitionId, AttributeValue>,
        subject: SubjectId,
    ) -> CoralResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        for &id in resources {
            let mut resource = self.store.get(id)?.clone();
            for (attribute, value) in values {
                resource
                    .attributes
                    .entry(*attribute)
                    .or_insert_with(|| value.clone());
            }
            resource.touch(subject);
            self.store.save(resource)?;
            self.emit(CoralEvent::ResourceChange {
                resource: id,
                subject,
            });
        }
        Ok(())
    }

    /// Drop from each listed resource the values its class no longer sees.
    fn prune_invisible_values(
        &mut self,
        resources: &[ResourceId],
        subject: SubjectId,
    ) -> CoralResult<()> {
        for &id in resources {
            let resource = self.store.get(id)?;
            let lineage = self.schema.lineage(resource.resource_class);
            let stale: Vec<AttributeDefinitionId> = resource
                .attributes
                .keys()
                .filter(|attribute| {
                    self.schema
                        .attributes
                        .get(attribute)
                        .is_none_or(|def| !lineage.contains(&def.declaring_class))
                })
                .copied()
                .collect();
            if stale.is_empty() {
                continue;
            }
            let mut resource = resource.clone();
            for attribute in stale {
                resource.attributes.remove(&attribute);
            }
            resource.touch(subject);
            self.store.save(resource)?;
            self.emit(CoralEvent::ResourceChange {
                resource: id,
                subject,
            });
        }
        Ok(())
    }

    pub(crate) fn create_attribute_class(
        &mut self,
        subject: SubjectId,
        name: &str,
        value_type: AttributeType,
    ) -> CoralResult<AttributeClass> {
        self.require_superuser(subject, "create attribute classes")?;
        if self.schema.attribute_classes.contains_name(name) {
            return Err(CoralError::exists(EntityKind::AttributeClass, name));
        }
        let class = AttributeClass::new(AttributeClassId(self.next_id()?), name, value_type);
        self.schema.attribute_classes.insert(class.clone())?;
        log::debug!("created attribute class {} ({})", class.name, value_type);
        self.emit(CoralEvent::AttributeClassChange {
            attribute_class: class.id,
        });
        Ok(class)
    }

    fn require_modifiable_attribute_class(&self, id: AttributeClassId) -> CoralResult<()> {
        let class = self.schema.attribute_classes.get(id)?;
        if class.is_builtin() {
            return Err(CoralError::Security(format!(
                "built-in attribute class {} cannot be changed",
                class.name
            )));
        }
        Ok(())
    }

    pub(crate) fn rename_attribute_class(
        &mut self,
        subject: SubjectId,
        id: AttributeClassId,
        name: &str,
    ) -> CoralResult<AttributeClass> {
        self.require_superuser(subject, "rename attribute classes")?;
        self.require_modifiable_attribute_class(id)?;
        let class = self.schema.attribute_classes.rename(id, name)?;
        self.emit(CoralEvent::AttributeClassChange { attribute_class: id });
        Ok(class)
    }

    pub(crate) fn delete_attribute_class(
        &mut self,
        subject: SubjectId,
        id: AttributeClassId,
    ) -> CoralResult<()> {
        self.require_superuser(subject, "delete attribute classes")?;
        self.require_modifiable_attribute_class(id)?;
        let class = self.schema.attribute_classes.get(id)?;
        if let Some(user) = self.schema.attributes.iter().find(|a| a.attribute_class == id) {
            return Err(CoralError::in_use(
                EntityKind::AttributeClass,
                &class.name,
                format!("attribute {} is declared with it", user.name),
            ));
        }
        self.schema.attribute_classes.remove(id)?;
        self.emit(CoralEvent::AttributeClassChange { attribute_class: id });
        Ok(())
    }

    pub(crate) fn create_resource_class(
        &mut self,
        subject: SubjectId,
        name: &str,
        handler: &str,
        flags: ResourceClassFlags,
    ) -> CoralResult<ResourceClass> {
        self.require_superuser(subject, "create resource classes")?;
        if self.schema.resource_classes.contains_name(name) {
            return Err(CoralError::exists(EntityKind::ResourceClass, name));
        }
        let flags = flags.without(ResourceClassFlags::BUILTIN);
        let class = ResourceClass::new(ResourceClassId(self.next_id()?), name, handler, flags);
        self.schema.resource_classes.insert(class.clone())?;
        log::debug!("created resource class {}", class.name);
        self.emit(CoralEvent::ResourceClassChange {
            resource_class: class.id,
        });
        Ok(class)
    }

    pub(crate) fn rename_resource_class(
        &mut self,
        subject: SubjectId,
        id: ResourceClassId,
        name: &str,
    ) -> CoralResult<ResourceClass> {
        self.require_superuser(subject, "rename resource classes")?;
        self.require_modifiable_class(id)?;
        let class = self.schema.resource_classes.rename(id, name)?;
        self.emit(CoralEvent::ResourceClassChange { resource_class: id });
        Ok(class)
    }

    pub(crate) fn set_resource_class_flags(
        &mut self,
        subject: SubjectId,
        id: ResourceClassId,
        flags: ResourceClassFlags,
    ) -> CoralResult<ResourceClass> {
        self.require_superuser(subject, "change resource classes")?;
        let mut class = self.require_modifiable_class(id)?.clone();
        let flags = flags.without(ResourceClassFlags::BUILTIN);
        if flags.contains(ResourceClassFlags::FINAL) && !self.schema.children(id).is_empty() {
            return Err(CoralError::in_use(
                EntityKind::ResourceClass,
                &class.name,
                "a final class cannot have child classes",
            ));
        }
        if flags.contains(ResourceClassFlags::ABSTRACT)
            && self.store.iter().any(|r| r.resource_class == id)
        {
            return Err(CoralError::in_use(
                EntityKind::ResourceClass,
                &class.name,
                "an abstract class cannot have instances",
            ));
        }
        class.flags = flags;
        self.schema.resource_classes.update(class.clone())?;
        self.emit(CoralEvent::ResourceClassChange { resource_class: id });
        Ok(class)
    }

    pub(crate) fn delete_resource_class(
        &mut self,
        subject: SubjectId,
        id: ResourceClassId,
    ) -> CoralResult<()> {
        self.require_superuser(subject, "delete resource classes")?;
        let class = self.require_modifiable_class(id)?;
        if self.store.iter().any(|r| r.resource_class == id) {
            return Err(CoralError::in_use(
                EntityKind::ResourceClass,
                &class.name,
                "resources of this class exist",
            ));
        }
        if !self.schema.children(id).is_empty() {
            return Err(CoralError::in_use(
                EntityKind::ResourceClass,
                &class.name,
                "child classes inherit from it",
            ));
        }

        let removed_edges = self.schema.inheritance.remove_where(|e| e.child == id)?;
        let removed_attributes = self
            .schema
            .attributes
            .remove_where(|a| a.declaring_class == id)?;
        let removed_associations = self
            .schema
            .associations
            .remove_where(|a| a.resource_class == id)?;
        self.schema.resource_classes.remove(id)?;
        log::debug!("deleted resource class {id}");

        for edge in removed_edges {
            self.emit(CoralEvent::ResourceClassInheritanceChange {
                parent: edge.parent,
                child: id,
                added: false,
            });
        }
        for attribute in removed_attributes {
            self.emit(CoralEvent::ResourceClassAttributesChange {
                resource_class: id,
                attribute: attribute.id,
                added: false,
            });
        }
        for association in removed_associations {
            self.emit(CoralEvent::PermissionAssociationChange {
                resource_class: id,
                permission: association.permission,
                added: false,
            });
        }
        self.emit(CoralEvent::ResourceClassChange { resource_class: id });
        Ok(())
    }

    pub(crate) fn add_attribute(
        &mut self,
        subject: SubjectId,
        class: ResourceClassId,
        attribute: NewAttribute,
    ) -> CoralResult<AttributeDefinition> {
        self.require_superuser(subject, "add attributes")?;
        let class_name = self.schema.resource_classes.get(class)?.name.clone();
        self.schema.attribute_classes.get(attribute.attribute_class)?;
        if attribute.name.is_empty() {
            return Err(CoralError::InvalidArgument(
                "attribute names must not be empty".into(),
            ));
        }
        let subtree = self.class_subtree(class);
        if self
            .schema
            .visible_attribute_names(subtree.iter().copied())
            .contains(&attribute.name)
        {
            return Err(CoralError::exists(
                EntityKind::AttributeDefinition,
                &attribute.name,
            ));
        }

        let definition = AttributeDefinition {
            id: AttributeDefinitionId(self.next_id()?),
            name: attribute.name,
            attribute_class: attribute.attribute_class,
            declaring_class: class,
            flags: attribute.flags,
            domain: attribute.domain,
        };
        if let Some(default) = &attribute.default {
            self.check_value(&definition, default)?;
        }
        let instances = self.instances_of(&subtree);
        if definition.is_required() && attribute.default.is_none() && !instances.is_empty() {
            return Err(CoralError::ValueRequired {
                attribute: definition.name,
                class: class_name,
            });
        }

        self.schema.attributes.insert(definition.clone())?;
        log::debug!("added attribute {} to {}", definition.name, class_name);
        self.emit(CoralEvent::AttributeDefinitionChange {
            attribute: definition.id,
            resource_class: class,
        });
        self.emit(CoralEvent::ResourceClassAttributesChange {
            resource_class: class,
            attribute: definition.id,
            added: true,
        });
        if let Some(default) = attribute.default {
            self.write_defaults(&instances, &BTreeMap::from([(definition.id, default)]), subject)?;
        }
        Ok(definition)
    }

    pub(crate) fn remove_attribute(
        &mut self,
        subject: SubjectId,
        id: AttributeDefinitionId,
    ) -> CoralResult<()> {
        self.require_superuser(subject, "remove attributes")?;
        let definition = self.schema.attribute(id)?.clone();
        if definition.flags.contains(AttributeFlags::BUILTIN) {
            return Err(CoralError::Security(format!(
                "built-in attribute {} cannot be removed",
                definition.name
            )));
        }
        self.schema.attributes.remove(&id)?;
        let instances = self.instances_of(&self.class_subtree(definition.declaring_class));
        self.prune_invisible_values(&instances, subject)?;
        self.emit(CoralEvent::ResourceClassAttributesChange {
            resource_class: definition.declaring_class,
            attribute: id,
            added: false,
        });
        self.emit(CoralEvent::AttributeDefinitionChange {
            attribute: id,
            resource_class: definition.declaring_class,
        });
        Ok(())
    }

    pub(crate) fn rename_attribute(
        &mut self,
        subject: SubjectId,
        id: AttributeDefinitionId,
        name: &str,
    ) -> CoralResult<AttributeDefinition> {
        self.require_superuser(subject, "rename attributes")?;
        let mut definition = self.schema.attribute(id)?.clone();
        if definition.name == name {
            return Ok(definition);
        }
        if name.is_empty() {
            return Err(CoralError::InvalidArgument(
                "attribute names must not be empty".into(),
            ));
        }
        let subtree = self.class_subtree(definition.declaring_class);
        if self
            .schema
            .visible_attribute_names(subtree)
            .contains(name)
        {
            return Err(CoralError::exists(EntityKind::AttributeDefinition, name));
        }
        definition.name = name.to_owned();
        self.schema.attributes.replace(definition.clone())?;
        self.emit(CoralEvent::AttributeDefinitionChange {
            attribute: id,
            resource_class: definition.declaring_class,
        });
        Ok(definition)
    }

    pub(crate) fn set_attribute_flags(
        &mut self,
        subject: SubjectId,
        id: AttributeDefinitionId,
        flags: AttributeFlags,
    ) -> CoralResult<AttributeDefinition> {
        self.require_superuser(subject, "change attributes")?;
        let mut definition = self.schema.attribute(id)?.clone();
        let builtin = definition.flags.contains(AttributeFlags::BUILTIN);
        if builtin != flags.contains(AttributeFlags::BUILTIN) {
            return Err(CoralError::Security(
                "the builtin flag cannot be changed".into(),
            ));
        }
        if flags.contains(AttributeFlags::REQUIRED) && !definition.is_required() {
            let subtree = self.class_subtree(definition.declaring_class);
            if let Some(missing) = self
                .store
                .iter()
                .find(|r| subtree.contains(&r.resource_class) && !r.is_defined(id))
            {
                let class = self.schema.resource_classes.get(missing.resource_class)?;
                return Err(CoralError::ValueRequired {
                    attribute: definition.name,
                    class: class.name.clone(),
                });
            }
        }
        definition.flags = flags;
        self.schema.attributes.replace(definition.clone())?;
        self.emit(CoralEvent::AttributeDefinitionChange {
            attribute: id,
            resource_class: definition.declaring_class,
        });
        Ok(definition)
    }

    pub(crate) fn add_parent_class(
        &mut self,
        subject: SubjectId,
        child: ResourceClassId,
        parent: ResourceClassId,
        mut defaults: BTreeMap<AttributeDefinitionId, AttributeValue>,
    ) -> CoralResult<()> {
        self.require_superuser(subject, "change class inheritance")?;
        let child_class = self.schema.resource_classes.get(child)?;
        let parent_class = self.schema.resource_classes.get(parent)?;
        let child_name = child_class.name.clone();
        if child == parent || self.schema.is_subclass_of(parent, child) {
            return Err(CoralError::CircularDependency(format!(
                "{} cannot inherit from {}",
                child_name, parent_class.name
            )));
        }
        if parent_class.is_final() {
            return Err(CoralError::InvalidArgument(format!(
                "{} is final and cannot be inherited from",
                parent_class.name
            )));
        }
        let edge = ResourceClassInheritance { parent, child };
        if self.schema.inheritance.contains(&edge.record_key()) {
            return Err(CoralError::exists(
                EntityKind::ResourceClassInheritance,
                format!("{} -> {}", parent_class.name, child_name),
            ));
        }

        let lineage = self.schema.lineage(child);
        let subtree = self.class_subtree(child);
        let existing = self.schema.visible_attribute_names(subtree.iter().copied());
        let gained: Vec<AttributeDefinition> = self
            .schema
            .all_attributes(parent)
            .into_iter()
            .filter(|a| !lineage.contains(&a.declaring_class))
            .cloned()
            .collect();
        if let Some(clash) = gained.iter().find(|a| existing.contains(&a.name)) {
            return Err(CoralError::exists(EntityKind::AttributeDefinition, &clash.name));
        }

        defaults.retain(|attribute, _| gained.iter().any(|a| a.id == *attribute));
        for attribute in &gained {
            if let Some(value) = defaults.get(&attribute.id) {
                self.check_value(attribute, value)?;
            }
        }
        let instances = self.instances_of(&subtree);
        if !instances.is_empty() {
            if let Some(missing) = gained
                .iter()
                .find(|a| a.is_required() && !defaults.contains_key(&a.id))
            {
                return Err(CoralError::ValueRequired {
                    attribute: missing.name.clone(),
                    class: child_name,
                });
            }
        }

        self.schema.inheritance.insert(edge)?;
        log::debug!("{child_name} now inherits from class {parent}");
        self.emit(CoralEvent::ResourceClassInheritanceChange {
            parent,
            child,
            added: true,
        });
        self.write_defaults(&instances, &defaults, subject)
    }

    pub(crate) fn remove_parent_class(
        &mut self,
        subject: SubjectId,
        child: ResourceClassId,
        parent: ResourceClassId,
    ) -> CoralResult<()> {
        self.require_superuser(subject, "change class inheritance")?;
        let edge = ResourceClassInheritance { parent, child };
        if self.schema.inheritance.remove(&edge.record_key())?.is_none() {
            return Err(CoralError::missing(
                EntityKind::ResourceClassInheritance,
                format!("{parent} -> {child}"),
            ));
        }
        let instances = self.instances_of(&self.class_subtree(child));
        self.prune_invisible_values(&instances, subject)?;
        self.emit(CoralEvent::ResourceClassInheritanceChange {
            parent,
            child,
            added: false,
        });
        Ok(())
    }

    pub(crate) fn add_class_permission(
        &mut self,
        subject: SubjectId,
        class: ResourceClassId,
        permission: PermissionId,
    ) -> CoralResult<()> {
        self.require_superuser(subject, "associate permissions")?;
        let class_name = &self.schema.resource_classes.get(class)?.name;
        let permission_name = self.security.permissions.get(permission)?.name();
        let association = PermissionAssociation {
            resource_class: class,
            permission,
        };
        if self.schema.associations.contains(&association.record_key()) {
            return Err(CoralError::exists(
                EntityKind::PermissionAssociation,
                format!("{permission_name} on {class_name}"),
            ));
        }
        self.schema.associations.insert(association)?;
        self.emit(CoralEvent::PermissionAssociationChange {
            resource_class: class,
            permission,
            added: true,
        });
        Ok(())
    }

    pub(crate) fn remove_class_permission(
        &mut self,
        subject: SubjectId,
        class: ResourceClassId,
        permission: PermissionId,
    ) -> CoralResult<()> {
        self.require_superuser(subject, "associate permissions")?;
        let key = (class, permission);
        if !self.schema.associations.contains(&key) {
            return Err(CoralError::missing(
                EntityKind::PermissionAssociation,
                format!("{permission} on {class}"),
            ));
        }
        let subtree = self.class_subtree(class);
        let in_use = self.security.permission_assignments.any(|a| {
            a.permission == permission
                && self
                    .store
                    .get(a.resource)
                    .is_ok_and(|r| subtree.contains(&r.resource_class))
        });
        if in_use {
            return Err(CoralError::in_use(
                EntityKind::PermissionAssociation,
                format!("{permission} on {class}"),
                "the permission is assigned on resources of this class",
            ));
        }
        self.schema.associations.remove(&key)?;
        self.emit(CoralEvent::PermissionAssociationChange {
            resource_class: class,
            permission,
            added: false,
        });
        Ok(())
    }
}

/// Schema access for one session.
///
/// Reads are open to every subject; every mutation needs a superuser.
pub struct CoralSchema<'a> {
    session: &'a CoralSession,
}

impl<'a> CoralSchema<'a> {
    pub(crate) fn new(session: &'a CoralSession) -> Self {
        Self { session }
    }

    pub fn create_attribute_class(
        &self,
        name: &str,
        value_type: AttributeType,
    ) -> CoralResult<AttributeClass> {
        self.session
            .mutate(|state, subject| state.create_attribute_class(subject, name, value_type))
    }

    pub fn attribute_class(&self, id: AttributeClassId) -> CoralResult<AttributeClass> {
        self.session
            .read(|state, _| state.schema.attribute_classes.get(id).cloned())
    }

    pub fn attribute_class_by_name(&self, name: &str) -> CoralResult<AttributeClass> {
        self.session
            .read(|state, _| state.schema.attribute_classes.get_by_name(name).cloned())
    }

    /// The built-in attribute class of a value type
    pub fn attribute_class_for(&self, value_type: AttributeType) -> CoralResult<AttributeClass> {
        let name: &'static str = value_type.into();
        self.attribute_class_by_name(name)
    }

    pub fn attribute_classes(&self) -> CoralResult<Vec<AttributeClass>> {
        self.session
            .read(|state, _| Ok(state.schema.attribute_classes.sorted()))
    }

    pub fn rename_attribute_class(
        &self,
        id: AttributeClassId,
        name: &str,
    ) -> CoralResult<AttributeClass> {
        self.session
            .mutate(|state, subject| state.rename_attribute_class(subject, id, name))
    }

    pub fn delete_attribute_class(&self, id: AttributeClassId) -> CoralResult<()> {
        self.session
            .mutate(|state, subject| state.delete_attribute_class(subject, id))
    }

    pub fn create_resource_class(
        &self,
        name: &str,
        handler: &str,
        flags: ResourceClassFlags,
    ) -> CoralResult<ResourceClass> {
        self.session
            .mutate(|state, subject| state.create_resource_class(subject, name, handler, flags))
    }

    pub fn resource_class(&self, id: ResourceClassId) -> CoralResult<ResourceClass> {
        self.session
            .read(|state, _| state.schema.resource_classes.get(id).cloned())
    }

    pub fn resource_class_by_name(&self, name: &str) -> CoralResult<ResourceClass> {
        self.session
            .read(|state, _| state.schema.resource_classes.get_by_name(name).cloned())
    }

    /// The built-in class of the root resource
    pub fn node_class(&self) -> CoralResult<ResourceClass> {
        self.session.read(|state, _| {
            state
                .schema
                .resource_classes
                .get(state.builtins.node_class)
                .cloned()
        })
    }

    pub fn resource_classes(&self) -> CoralResult<Vec<ResourceClass>> {
        self.session
            .read(|state, _| Ok(state.schema.resource_classes.sorted()))
    }

    pub fn rename_resource_class(
        &self,
        id: ResourceClassId,
        name: &str,
    ) -> CoralResult<ResourceClass> {
        self.session
            .mutate(|state, subject| state.rename_resource_class(subject, id, name))
    }

    pub fn set_resource_class_flags(
        &self,
        id: ResourceClassId,
        flags: ResourceClassFlags,
    ) -> CoralResult<ResourceClass> {
        self.session
            .mutate(|state, subject| state.set_resource_class_flags(subject, id, flags))
    }

    pub fn delete_resource_class(&self, id: ResourceClassId) -> CoralResult<()> {
        self.session
            .mutate(|state, subject| state.delete_resource_class(subject, id))
    }

    pub fn add_attribute(
        &self,
        class: ResourceClassId,
        attribute: NewAttribute,
    ) -> CoralResult<AttributeDefinition> {
        self.session
            .mutate(|state, subject| state.add_attribute(subject, class, attribute))
    }

    pub fn remove_attribute(&self, id: AttributeDefinitionId) -> CoralResult<()> {
        self.session
            .mutate(|state, subject| state.remove_attribute(subject, id))
    }

    pub fn rename_attribute(
        &self,
        id: AttributeDefinitionId,
        name: &str,
    ) -> CoralResult<AttributeDefinition> {
        self.session
            .mutate(|state, subject| state.rename_attribute(subject, id, name))
    }

    pub fn set_attribute_flags(
        &self,
        id: AttributeDefinitionId,
        flags: AttributeFlags,
    ) -> CoralResult<AttributeDefinition> {
        self.session
            .mutate(|state, subject| state.set_attribute_flags(subject, id, flags))
    }

    pub fn attribute(&self, id: AttributeDefinitionId) -> CoralResult<AttributeDefinition> {
        self.session
            .read(|state, _| state.schema.attribute(id).cloned())
    }

    /// Find an attribute visible from `class` by name, inherited ones included
    pub fn attribute_by_name(
        &self,
        class: ResourceClassId,
        name: &str,
    ) -> CoralResult<AttributeDefinition> {
        self.session.read(|state, _| {
            state.schema.resource_classes.get(class)?;
            state
                .schema
                .find_attribute(class, name)
                .cloned()
                .ok_or_else(|| CoralError::missing(EntityKind::AttributeDefinition, name))
        })
    }

    /// Attributes declared by `class` itself
    pub fn declared_attributes(
        &self,
        class: ResourceClassId,
    ) -> CoralResult<Vec<AttributeDefinition>> {
        self.session.read(|state, _| {
            state.schema.resource_classes.get(class)?;
            Ok(state
                .schema
                .declared_attributes(class)
                .into_iter()
                .cloned()
                .collect())
        })
    }

    /// Attributes declared by `class` and every class it inherits from
    pub fn all_attributes(&self, class: ResourceClassId) -> CoralResult<Vec<AttributeDefinition>> {
        self.session.read(|state, _| {
            state.schema.resource_classes.get(class)?;
            Ok(state
                .schema
                .all_attributes(class)
                .into_iter()
                .cloned()
                .collect())
        })
    }

    /// Make `child` inherit from `parent`.
    ///
    /// `defaults` supplies values for the attributes `child` gains, written to
    /// existing instances. Required gained attributes need one when instances
    /// exist.
    pub fn add_parent_class(
        &self,
        child: ResourceClassId,
        parent: ResourceClassId,
        defaults: BTreeMap<AttributeDefinitionId, AttributeValue>,
    ) -> CoralResult<()> {
        self.session
            .mutate(|state, subject| state.add_parent_class(subject, child, parent, defaults))
    }

    pub fn remove_parent_class(
        &self,
        child: ResourceClassId,
        parent: ResourceClassId,
    ) -> CoralResult<()> {
        self.session
            .mutate(|state, subject| state.remove_parent_class(subject, child, parent))
    }

    pub fn parent_classes(&self, class: ResourceClassId) -> CoralResult<Vec<ResourceClass>> {
        self.session.read(|state, _| {
            state
                .schema
                .parents(class)
                .into_iter()
                .map(|id| state.schema.resource_classes.get(id).cloned())
                .collect()
        })
    }

    pub fn child_classes(&self, class: ResourceClassId) -> CoralResult<Vec<ResourceClass>> {
        self.session.read(|state, _| {
            state
                .schema
                .children(class)
                .into_iter()
                .map(|id| state.schema.resource_classes.get(id).cloned())
                .collect()
        })
    }

    /// True when `class` is `ancestor` or inherits from it
    pub fn is_subclass_of(
        &self,
        class: ResourceClassId,
        ancestor: ResourceClassId,
    ) -> CoralResult<bool> {
        self.session
            .read(|state, _| Ok(state.schema.is_subclass_of(class, ancestor)))
    }

    pub fn add_class_permission(
        &self,
        class: ResourceClassId,
        permission: PermissionId,
    ) -> CoralResult<()> {
        self.session
            .mutate(|state, subject| state.add_class_permission(subject, class, permission))
    }

    pub fn remove_class_permission(
        &self,
        class: ResourceClassId,
        permission: PermissionId,
    ) -> CoralResult<()> {
        self.session
            .mutate(|state, subject| state.remove_class_permission(subject, class, permission))
    }

    /// Permissions applicable to resources of `class`, inherited ones included
    pub fn class_permissions(&self, class: ResourceClassId) -> CoralResult<Vec<Permission>> {
        self.session.read(|state, _| {
            state.schema.resource_classes.get(class)?;
            state
                .schema
                .class_permissions(class)
                .into_iter()
                .map(|id| state.security.permissions.get(id).cloned())
                .collect()
        })
    }
}
