use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use crate::entity::{AttributeDefinitionId, ResourceClassId, ResourceId, SubjectId};
use crate::schema::AttributeValue;
use crate::traits::CoralRecord;
use crate::utils::CoralDateTime;

/// A node of the resource tree.
///
/// Only the root resource has no parent. Attribute values are keyed by the id of
/// the attribute definition they fill, which may be declared by the resource's
/// class or any of its ancestors.
#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub struct Resource {
    pub(crate) id: ResourceId,
    pub(crate) name: String,
    pub(crate) resource_class: ResourceClassId,
    pub(crate) parent: Option<ResourceId>,
    pub(crate) owner: SubjectId,
    pub(crate) created_by: SubjectId,
    #[bincode(with_serde)]
    pub(crate) creation_time: CoralDateTime,
    pub(crate) modified_by: SubjectId,
    #[bincode(with_serde)]
    pub(crate) modification_time: CoralDateTime,
    pub(crate) attributes: BTreeMap<AttributeDefinitionId, AttributeValue>,
}

impl Resource {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_class(&self) -> ResourceClassId {
        self.resource_class
    }

    pub fn parent(&self) -> Option<ResourceId> {
        self.parent
    }

    pub fn owner(&self) -> SubjectId {
        self.owner
    }

    pub fn created_by(&self) -> SubjectId {
        self.created_by
    }

    pub fn creation_time(&self) -> CoralDateTime {
        self.creation_time
    }

    pub fn modified_by(&self) -> SubjectId {
        self.modified_by
    }

    pub fn modification_time(&self) -> CoralDateTime {
        self.modification_time
    }

    pub fn get(&self, attribute: AttributeDefinitionId) -> Option<&AttributeValue> {
        self.attributes.get(&attribute)
    }

    pub fn is_defined(&self, attribute: AttributeDefinitionId) -> bool {
        self.attributes.contains_key(&attribute)
    }

    pub fn attributes(&self) -> &BTreeMap<AttributeDefinitionId, AttributeValue> {
        &self.attributes
    }

    pub(crate) fn touch(&mut self, subject: SubjectId) {
        self.modified_by = subject;
        self.modification_time = crate::utils::datetime::now();
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl CoralRecord for Resource {
    const TREE: &'static str = "resources";
    type Key = ResourceId;

    fn record_key(&self) -> Self::Key {
        self.id
    }
}
