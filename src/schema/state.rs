use std::collections::{BTreeSet, VecDeque};

use super::model::{
    AttributeClass, AttributeDefinition, AttributeType, ResourceClass, ResourceClassInheritance,
};
use crate::databases::SledStore;
use crate::entity::{
    AttributeDefinitionId, EntityRegistry, PermissionId, RecordSet, ResourceClassId,
};
use crate::error::{CoralError, CoralResult, EntityKind};
use crate::security::PermissionAssociation;

/// Cached schema records and the class hierarchy queries built on them.
pub(crate) struct SchemaState {
    pub attribute_classes: EntityRegistry<AttributeClass>,
    pub resource_classes: EntityRegistry<ResourceClass>,
    pub attributes: RecordSet<AttributeDefinition>,
    pub inheritance: RecordSet<ResourceClassInheritance>,
    pub associations: RecordSet<PermissionAssociation>,
}

impl SchemaState {
    pub fn load(db: &SledStore) -> CoralResult<Self> {
        Ok(Self {
            attribute_classes: EntityRegistry::load(db.open_tree()?)?,
            resource_classes: EntityRegistry::load(db.open_tree()?)?,
            attributes: RecordSet::load(db.open_tree()?)?,
            inheritance: RecordSet::load(db.open_tree()?)?,
            associations: RecordSet::load(db.open_tree()?)?,
        })
    }

    pub fn commit(&mut self) -> CoralResult<()> {
        self.attribute_classes.commit()?;
        self.resource_classes.commit()?;
        self.attributes.commit()?;
        self.inheritance.commit()?;
        self.associations.commit()
    }

    pub fn rollback(&mut self) {
        self.attribute_classes.rollback();
        self.resource_classes.rollback();
        self.attributes.rollback();
        self.inheritance.rollback();
        self.associations.rollback();
    }

    pub fn attribute(&self, id: AttributeDefinitionId) -> CoralResult<&AttributeDefinition> {
        self.attributes
            .get(&id)
            .ok_or_else(|| CoralError::missing(EntityKind::AttributeDefinition, id))
    }

    pub fn attribute_type(&self, attribute: &AttributeDefinition) -> CoralResult<AttributeType> {
        Ok(self
            .attribute_classes
            .get(attribute.attribute_class)?
            .value_type())
    }

    /// Direct parents of `class`
    pub fn parents(&self, class: ResourceClassId) -> Vec<ResourceClassId> {
        self.inheritance
            .iter()
            .filter(|edge| edge.child == class)
            .map(|edge| edge.parent)
            .collect()
    }

    /// Direct children of `class`
    pub fn children(&self, class: ResourceClassId) -> Vec<ResourceClassId> {
        self.inheritance
            .iter()
            .filter(|edge| edge.parent == class)
            .map(|edge| edge.child)
            .collect()
    }

    /// Transitive parents, not including `class` itself
    pub fn ancestors(&self, class: ResourceClassId) -> BTreeSet<ResourceClassId> {
        self.walk(class, |c| self.parents(c))
    }

    /// Transitive children, not including `class` itself
    pub fn descendants(&self, class: ResourceClassId) -> BTreeSet<ResourceClassId> {
        self.walk(class, |c| self.children(c))
    }

    fn walk(
        &self,
        start: ResourceClassId,
        next: impl Fn(ResourceClassId) -> Vec<ResourceClassId>,
    ) -> BTreeSet<ResourceClassId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from(next(start));
        while let Some(class) = queue.pop_front() {
            if class != start && seen.insert(class) {
                queue.extend(next(class));
            }
        }
        seen
    }

    /// `class` and all of its ancestors
    pub fn lineage(&self, class: ResourceClassId) -> BTreeSet<ResourceClassId> {
        let mut lineage = self.ancestors(class);
        lineage.insert(class);
        lineage
    }

    pub fn is_subclass_of(&self, class: ResourceClassId, ancestor: ResourceClassId) -> bool {
        class == ancestor || self.ancestors(class).contains(&ancestor)
    }

    pub fn declared_attributes(&self, class: ResourceClassId) -> Vec<&AttributeDefinition> {
        self.attributes
            .iter()
            .filter(|a| a.declaring_class == class)
            .collect()
    }

    /// Attributes declared by `class` or inherited from its ancestors
    pub fn all_attributes(&self, class: ResourceClassId) -> Vec<&AttributeDefinition> {
        let lineage = self.lineage(class);
        self.attributes
            .iter()
            .filter(|a| lineage.contains(&a.declaring_class))
            .collect()
    }

    pub fn find_attribute(
        &self,
        class: ResourceClassId,
        name: &str,
    ) -> Option<&AttributeDefinition> {
        self.all_attributes(class)
            .into_iter()
            .find(|a| a.name == name)
    }

    /// Names of every attribute visible from any of `classes`
    pub fn visible_attribute_names(
        &self,
        classes: impl IntoIterator<Item = ResourceClassId>,
    ) -> BTreeSet<String> {
        classes
            .into_iter()
            .flat_map(|class| self.all_attributes(class))
            .map(|a| a.name.clone())
            .collect()
    }

    /// Permissions associated with `class` or any of its ancestors
    pub fn class_permissions(&self, class: ResourceClassId) -> BTreeSet<PermissionId> {
        let lineage = self.lineage(class);
        self.associations
            .iter()
            .filter(|a| lineage.contains(&a.resource_class))
            .map(|a| a.permission)
            .collect()
    }
}
