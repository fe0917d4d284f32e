use std::collections::{BTreeSet, HashMap};

use super::model::Resource;
use crate::databases::SledStore;
use crate::entity::{RecordSet, ResourceId};
use crate::error::{CoralError, CoralResult, EntityKind};

fn child_index(resources: &RecordSet<Resource>) -> HashMap<ResourceId, BTreeSet<ResourceId>> {
    let mut children: HashMap<ResourceId, BTreeSet<ResourceId>> = HashMap::new();
    for resource in resources.iter() {
        if let Some(parent) = resource.parent {
            children.entry(parent).or_default().insert(resource.id);
        }
    }
    children
}

/// Cached resources and the parent to children index over them.
pub(crate) struct StoreState {
    resources: RecordSet<Resource>,
    children: HashMap<ResourceId, BTreeSet<ResourceId>>,
}

impl StoreState {
    pub fn load(db: &SledStore) -> CoralResult<Self> {
        let resources: RecordSet<Resource> = RecordSet::load(db.open_tree()?)?;
        log::debug!("loaded {} resources", resources.len());
        Ok(Self {
            children: child_index(&resources),
            resources,
        })
    }

    pub fn commit(&mut self) -> CoralResult<()> {
        self.resources.commit()
    }

    /// Undo uncommitted changes and rebuild the child index
    pub fn rollback(&mut self) {
        self.resources.rollback();
        self.children = child_index(&self.resources);
    }

    pub fn get(&self, id: ResourceId) -> CoralResult<&Resource> {
        self.resources
            .get(&id)
            .ok_or_else(|| CoralError::missing(EntityKind::Resource, id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn children(&self, id: ResourceId) -> Vec<ResourceId> {
        self.children
            .get(&id)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_children(&self, id: ResourceId) -> bool {
        self.children.get(&id).is_some_and(|c| !c.is_empty())
    }

    /// Parent chain of `id`, nearest first
    pub fn ancestors(&self, id: ResourceId) -> Vec<ResourceId> {
        let mut chain = Vec::new();
        let mut current = self.resources.get(&id).and_then(|r| r.parent);
        while let Some(parent) = current {
            if chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = self.resources.get(&parent).and_then(|r| r.parent);
        }
        chain
    }

    pub fn is_ancestor(&self, ancestor: ResourceId, descendant: ResourceId) -> bool {
        self.ancestors(descendant).contains(&ancestor)
    }

    /// `id` and everything below it, children before their parents
    pub fn subtree(&self, id: ResourceId) -> Vec<ResourceId> {
        let mut order = Vec::new();
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                order.push(current);
                continue;
            }
            stack.push((current, true));
            for child in self.children(current) {
                stack.push((child, false));
            }
        }
        order
    }

    pub fn insert(&mut self, resource: Resource) -> CoralResult<()> {
        if let Some(parent) = resource.parent {
            self.children.entry(parent).or_default().insert(resource.id);
        }
        self.resources.replace(resource)?;
        Ok(())
    }

    /// Write back a modified resource, moving it in the child index if its
    /// parent changed.
    pub fn save(&mut self, resource: Resource) -> CoralResult<()> {
        let id = resource.id;
        let new_parent = resource.parent;
        if let Some(old) = self.resources.replace(resource)? {
            if old.parent != new_parent {
                self.unlink(id, old.parent);
                if let Some(parent) = new_parent {
                    self.children.entry(parent).or_default().insert(id);
                }
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, id: ResourceId) -> CoralResult<Resource> {
        let resource = self
            .resources
            .remove(&id)?
            .ok_or_else(|| CoralError::missing(EntityKind::Resource, id))?;
        self.unlink(id, resource.parent);
        self.children.remove(&id);
        Ok(resource)
    }

    fn unlink(&mut self, id: ResourceId, parent: Option<ResourceId>) {
        if let Some(parent) = parent {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.remove(&id);
                if siblings.is_empty() {
                    self.children.remove(&parent);
                }
            }
        }
    }
}
