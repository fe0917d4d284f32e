//! Entity ids and the journaled registries that cache them.
//!
//! Every entity type lives in an [`EntityRegistry`], which keeps an in-memory index
//! by id and by name in front of its Sled tree. Join records (assignments,
//! associations, inheritance edges) live in a [`RecordSet`]. Both hold changes
//! in memory until they are committed, so a failed mutation can be rolled back.

use std::collections::{BTreeMap, HashMap};

use crate::databases::SledStoreTree;
use crate::error::{CoralError, CoralResult};
use crate::traits::{CoralRecord, Entity};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            bincode::Encode,
            bincode::Decode,
            serde::Serialize,
            serde::Deserialize,
            derive_more::From,
            derive_more::Into,
            derive_more::Display,
        )]
        #[display("{_0}")]
        pub struct $name(pub u64);
    };
}

entity_id!(
    /// Id of a security principal
    SubjectId
);
entity_id!(
    /// Id of a role
    RoleId
);
entity_id!(
    /// Id of a grantable permission
    PermissionId
);
entity_id!(
    /// Id of a resource in the tree
    ResourceId
);
entity_id!(
    /// Id of a resource class
    ResourceClassId
);
entity_id!(
    /// Id of an attribute class
    AttributeClassId
);
entity_id!(
    /// Id of an attribute definition
    AttributeDefinitionId
);

/// In-memory index over one entity type, backed by its tree.
///
/// Changes are applied to memory at once and journaled. [`commit`] writes the
/// journaled entities to the tree; [`rollback`] restores them in memory.
///
/// [`commit`]: EntityRegistry::commit
/// [`rollback`]: EntityRegistry::rollback
pub struct EntityRegistry<E: Entity> {
    tree: SledStoreTree<E>,
    by_id: HashMap<E::Id, E>,
    by_name: HashMap<String, E::Id>,
    /// State of each touched entity before the pending changes
    journal: HashMap<E::Id, Option<E>>,
}

impl<E: Entity> EntityRegistry<E> {
    /// Load every entity stored in `tree`
    pub fn load(tree: SledStoreTree<E>) -> CoralResult<Self> {
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();
        for entity in tree.iter() {
            let entity = entity?;
            by_name.insert(entity.name().to_owned(), entity.id());
            by_id.insert(entity.id(), entity);
        }
        log::debug!("loaded {} {} records", by_id.len(), E::KIND);
        Ok(Self {
            tree,
            by_id,
            by_name,
            journal: HashMap::new(),
        })
    }

    fn touch(&mut self, id: E::Id) {
        if !self.journal.contains_key(&id) {
            self.journal.insert(id, self.by_id.get(&id).cloned());
        }
    }

    pub fn get(&self, id: E::Id) -> CoralResult<&E> {
        self.by_id
            .get(&id)
            .ok_or_else(|| CoralError::missing(E::KIND, id))
    }

    pub fn get_by_name(&self, name: &str) -> CoralResult<&E> {
        self.by_name
            .get(name)
            .and_then(|id| self.by_id.get(id))
            .ok_or_else(|| CoralError::missing(E::KIND, name))
    }

    pub fn contains(&self, id: E::Id) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Add a new entity. Fails with `EntityExists` when the name is taken.
    pub fn insert(&mut self, entity: E) -> CoralResult<()> {
        if self.by_name.contains_key(entity.name()) {
            return Err(CoralError::exists(E::KIND, entity.name()));
        }
        self.touch(entity.id());
        self.by_name.insert(entity.name().to_owned(), entity.id());
        self.by_id.insert(entity.id(), entity);
        Ok(())
    }

    /// Replace a stored entity, keeping the name index consistent.
    pub fn update(&mut self, entity: E) -> CoralResult<()> {
        let id = entity.id();
        let old_name = self.get(id)?.name().to_owned();
        if old_name != entity.name() {
            if self.by_name.contains_key(entity.name()) {
                return Err(CoralError::exists(E::KIND, entity.name()));
            }
            self.by_name.remove(&old_name);
            self.by_name.insert(entity.name().to_owned(), id);
        }
        self.touch(id);
        self.by_id.insert(id, entity);
        Ok(())
    }

    pub fn rename(&mut self, id: E::Id, name: &str) -> CoralResult<E> {
        let mut entity = self.get(id)?.clone();
        entity.set_name(name.to_owned());
        self.update(entity.clone())?;
        Ok(entity)
    }

    pub fn remove(&mut self, id: E::Id) -> CoralResult<E> {
        self.get(id)?;
        self.touch(id);
        let entity = self
            .by_id
            .remove(&id)
            .ok_or_else(|| CoralError::missing(E::KIND, id))?;
        self.by_name.remove(entity.name());
        Ok(entity)
    }

    /// Write every journaled change to the tree in one batch.
    pub fn commit(&mut self) -> CoralResult<()> {
        if self.journal.is_empty() {
            return Ok(());
        }
        let mut puts = Vec::new();
        let mut removes = Vec::new();
        for (id, before) in &self.journal {
            match (self.by_id.get(id), before) {
                (Some(current), _) => puts.push(current),
                (None, Some(before)) => removes.push(before.record_key()),
                (None, None) => {}
            }
        }
        self.tree.apply(puts, &removes)?;
        self.journal.clear();
        Ok(())
    }

    /// Undo every change made since the last commit.
    pub fn rollback(&mut self) {
        let journal = std::mem::take(&mut self.journal);
        for id in journal.keys() {
            if let Some(current) = self.by_id.remove(id) {
                if self.by_name.get(current.name()) == Some(id) {
                    self.by_name.remove(current.name());
                }
            }
        }
        for (id, before) in journal {
            if let Some(before) = before {
                self.by_name.insert(before.name().to_owned(), id);
                self.by_id.insert(id, before);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.by_id.values()
    }

    /// All entities ordered by id
    pub fn sorted(&self) -> Vec<E> {
        let mut all: Vec<E> = self.by_id.values().cloned().collect();
        all.sort_by_key(|e| e.id());
        all
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Ordered set of join records backed by its tree, journaled like
/// [`EntityRegistry`].
pub struct RecordSet<R: CoralRecord> {
    tree: SledStoreTree<R>,
    items: BTreeMap<R::Key, R>,
    journal: BTreeMap<R::Key, Option<R>>,
}

impl<R: CoralRecord> RecordSet<R> {
    pub fn load(tree: SledStoreTree<R>) -> CoralResult<Self> {
        let mut items = BTreeMap::new();
        for record in tree.iter() {
            let record = record?;
            items.insert(record.record_key(), record);
        }
        Ok(Self {
            tree,
            items,
            journal: BTreeMap::new(),
        })
    }

    fn touch(&mut self, key: &R::Key) {
        if !self.journal.contains_key(key) {
            self.journal.insert(key.clone(), self.items.get(key).cloned());
        }
    }

    pub fn contains(&self, key: &R::Key) -> bool {
        self.items.contains_key(key)
    }

    pub fn get(&self, key: &R::Key) -> Option<&R> {
        self.items.get(key)
    }

    /// Insert a record, returning `false` if one with the same key was present.
    pub fn insert(&mut self, record: R) -> CoralResult<bool> {
        let key = record.record_key();
        if self.items.contains_key(&key) {
            return Ok(false);
        }
        self.touch(&key);
        self.items.insert(key, record);
        Ok(true)
    }

    /// Insert or overwrite a record, returning the previous one.
    pub fn replace(&mut self, record: R) -> CoralResult<Option<R>> {
        let key = record.record_key();
        self.touch(&key);
        Ok(self.items.insert(key, record))
    }

    pub fn remove(&mut self, key: &R::Key) -> CoralResult<Option<R>> {
        if !self.items.contains_key(key) {
            return Ok(None);
        }
        self.touch(key);
        Ok(self.items.remove(key))
    }

    /// Remove every record matching `predicate`, returning what was removed.
    pub fn remove_where(&mut self, predicate: impl Fn(&R) -> bool) -> CoralResult<Vec<R>> {
        let keys: Vec<R::Key> = self
            .items
            .iter()
            .filter(|(_, record)| predicate(record))
            .map(|(key, _)| key.clone())
            .collect();
        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = self.remove(&key)? {
                removed.push(record);
            }
        }
        Ok(removed)
    }

    pub fn commit(&mut self) -> CoralResult<()> {
        if self.journal.is_empty() {
            return Ok(());
        }
        let mut puts = Vec::new();
        let mut removes = Vec::new();
        for (key, before) in &self.journal {
            match (self.items.get(key), before) {
                (Some(current), _) => puts.push(current),
                (None, Some(_)) => removes.push(key),
                (None, None) => {}
            }
        }
        self.tree.apply(puts, removes)?;
        self.journal.clear();
        Ok(())
    }

    pub fn rollback(&mut self) {
        for (key, before) in std::mem::take(&mut self.journal) {
            match before {
                Some(record) => {
                    self.items.insert(key, record);
                }
                None => {
                    self.items.remove(&key);
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.items.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &R::Key> {
        self.items.keys()
    }

    pub fn any(&self, predicate: impl Fn(&R) -> bool) -> bool {
        self.items.values().any(predicate)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::databases::SledStore;
    use crate::error::EntityKind;
    use crate::security::{RoleImplication, Subject};

    fn registry() -> EntityRegistry<Subject> {
        let store = SledStore::temp().unwrap();
        EntityRegistry::load(store.open_tree().unwrap()).unwrap()
    }

    #[test]
    fn test_names_are_unique() {
        let mut subjects = registry();
        subjects.insert(Subject::new(SubjectId(1), "alice")).unwrap();
        let err = subjects
            .insert(Subject::new(SubjectId(2), "alice"))
            .unwrap_err();
        assert!(matches!(
            err,
            CoralError::EntityExists {
                kind: EntityKind::Subject,
                ..
            }
        ));
    }

    #[test]
    fn test_rename_moves_name_index() {
        let mut subjects = registry();
        subjects.insert(Subject::new(SubjectId(1), "alice")).unwrap();
        subjects.insert(Subject::new(SubjectId(2), "bob")).unwrap();

        subjects.rename(SubjectId(1), "carol").unwrap();
        assert!(subjects.get_by_name("alice").is_err());
        assert_eq!(subjects.get_by_name("carol").unwrap().id(), SubjectId(1));
        assert!(subjects.rename(SubjectId(2), "carol").is_err());
    }

    #[test]
    fn test_reload_sees_committed_entities() {
        let store = SledStore::temp().unwrap();
        {
            let mut subjects: EntityRegistry<Subject> =
                EntityRegistry::load(store.open_tree().unwrap()).unwrap();
            subjects.insert(Subject::new(SubjectId(5), "dave")).unwrap();
            subjects.insert(Subject::new(SubjectId(6), "erin")).unwrap();
            subjects.commit().unwrap();
            subjects.remove(SubjectId(6)).unwrap();
            subjects.commit().unwrap();
            // never committed
            subjects.insert(Subject::new(SubjectId(7), "frank")).unwrap();
        }
        let subjects: EntityRegistry<Subject> =
            EntityRegistry::load(store.open_tree().unwrap()).unwrap();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects.get(SubjectId(5)).unwrap().name(), "dave");
        assert!(subjects.get(SubjectId(6)).is_err());
        assert!(subjects.get(SubjectId(7)).is_err());
    }

    #[test]
    fn test_rollback_restores_entities_and_names() {
        let mut subjects = registry();
        subjects.insert(Subject::new(SubjectId(1), "alice")).unwrap();
        subjects.insert(Subject::new(SubjectId(2), "bob")).unwrap();
        subjects.commit().unwrap();

        subjects.rename(SubjectId(1), "carol").unwrap();
        subjects.rename(SubjectId(2), "alice").unwrap();
        subjects.remove(SubjectId(2)).unwrap();
        subjects.insert(Subject::new(SubjectId(3), "bob")).unwrap();
        subjects.rollback();

        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects.get_by_name("alice").unwrap().id(), SubjectId(1));
        assert_eq!(subjects.get_by_name("bob").unwrap().id(), SubjectId(2));
        assert!(subjects.get_by_name("carol").is_err());
        assert!(subjects.get(SubjectId(3)).is_err());
    }

    #[test]
    fn test_record_set_rollback() {
        let store = SledStore::temp().unwrap();
        let mut edges: RecordSet<RoleImplication> =
            RecordSet::load(store.open_tree().unwrap()).unwrap();
        let kept = RoleImplication {
            super_role: RoleId(1),
            sub_role: RoleId(2),
        };
        edges.insert(kept).unwrap();
        edges.commit().unwrap();

        edges.remove(&kept.record_key()).unwrap();
        edges
            .insert(RoleImplication {
                super_role: RoleId(3),
                sub_role: RoleId(4),
            })
            .unwrap();
        edges.rollback();

        assert_eq!(edges.iter().cloned().collect::<Vec<_>>(), vec![kept]);
        let reloaded: RecordSet<RoleImplication> =
            RecordSet::load(store.open_tree().unwrap()).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.contains(&kept.record_key()));
    }
}
