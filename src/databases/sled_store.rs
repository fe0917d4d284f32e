use crate::config::CoralConfig;
use crate::error::CoralResult;
use crate::traits::CoralRecord;
use bincode::config::standard;
use bincode::{decode_from_slice, encode_to_vec};
use std::marker::PhantomData;

/// Thin wrapper around `sled::Db` handing out typed record trees.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open the database described by `config`
    pub fn open(config: &CoralConfig) -> CoralResult<Self> {
        let db = config.sled_config().open()?;
        Ok(Self { db })
    }

    /// Create an in-memory SledStore (useful for testing)
    pub fn temp() -> CoralResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Open the tree holding records of type `R`
    pub fn open_tree<R: CoralRecord>(&self) -> CoralResult<SledStoreTree<R>> {
        let tree = self.db.open_tree(R::TREE)?;
        Ok(SledStoreTree {
            tree,
            _phantom: PhantomData,
        })
    }

    /// Allocate a fresh, never reused id. Ids start at 1.
    pub fn generate_id(&self) -> CoralResult<u64> {
        Ok(self.db.generate_id()? + 1)
    }

    /// Flush the database to disk
    pub fn flush(&self) -> CoralResult<usize> {
        Ok(self.db.flush()?)
    }
}

/// Typed view over one Sled tree.
///
/// Keys and values are bincode-encoded with the standard configuration.
pub struct SledStoreTree<R: CoralRecord> {
    tree: sled::Tree,
    _phantom: PhantomData<R>,
}

impl<R: CoralRecord> Clone for SledStoreTree<R> {
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<R: CoralRecord> SledStoreTree<R> {
    /// Insert or replace a record under its own key
    pub fn put(&self, record: &R) -> CoralResult<()> {
        let key_bytes = encode_to_vec(record.record_key(), standard())?;
        let value_bytes = encode_to_vec(record, standard())?;
        self.tree.insert(key_bytes, value_bytes)?;
        Ok(())
    }

    /// Get a record by key
    pub fn get(&self, key: &R::Key) -> CoralResult<Option<R>> {
        let key_bytes = encode_to_vec(key, standard())?;
        match self.tree.get(key_bytes)? {
            Some(ivec) => {
                let (record, _) = decode_from_slice(&ivec, standard())?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Delete a record by key, returning it if present
    pub fn remove(&self, key: &R::Key) -> CoralResult<Option<R>> {
        let key_bytes = encode_to_vec(key, standard())?;
        match self.tree.remove(key_bytes)? {
            Some(ivec) => {
                let (record, _) = decode_from_slice(&ivec, standard())?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Iterate over all records in the tree
    pub fn iter(&self) -> impl Iterator<Item = CoralResult<R>> + '_ {
        self.tree.iter().values().map(|value| -> CoralResult<R> {
            let ivec = value?;
            let (record, _) = decode_from_slice(&ivec, standard())?;
            Ok(record)
        })
    }

    /// Get the number of records in the tree
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Check if the tree is empty
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Write `puts` and delete `removes` as one atomic batch.
    ///
    /// Everything is encoded before the tree is touched, so an encoding error
    /// leaves the tree unchanged.
    pub fn apply<'r>(
        &self,
        puts: impl IntoIterator<Item = &'r R>,
        removes: impl IntoIterator<Item = &'r R::Key>,
    ) -> CoralResult<()> {
        let mut batch = sled::Batch::default();
        for record in puts {
            let key_bytes = encode_to_vec(record.record_key(), standard())?;
            batch.insert(key_bytes, encode_to_vec(record, standard())?);
        }
        for key in removes {
            batch.remove(encode_to_vec(key, standard())?);
        }
        self.tree.apply_batch(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
    struct Note {
        id: u64,
        text: String,
    }

    impl CoralRecord for Note {
        const TREE: &'static str = "notes";
        type Key = u64;

        fn record_key(&self) -> u64 {
            self.id
        }
    }

    #[test]
    fn test_put_get_remove() {
        let store = SledStore::temp().unwrap();
        let tree = store.open_tree::<Note>().unwrap();
        let note = Note {
            id: 7,
            text: "hello".into(),
        };

        tree.put(&note).unwrap();
        assert_eq!(tree.get(&7).unwrap(), Some(note.clone()));
        assert_eq!(tree.len(), 1);

        assert_eq!(tree.remove(&7).unwrap(), Some(note));
        assert!(tree.get(&7).unwrap().is_none());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_generated_ids_are_distinct_and_positive() {
        let store = SledStore::temp().unwrap();
        let a = store.generate_id().unwrap();
        let b = store.generate_id().unwrap();
        assert!(a >= 1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_apply_writes_a_batch() {
        let store = SledStore::temp().unwrap();
        let tree = store.open_tree::<Note>().unwrap();
        let old = Note {
            id: 1,
            text: "old".into(),
        };
        tree.put(&old).unwrap();

        let notes: Vec<Note> = (2..=3)
            .map(|id| Note {
                id,
                text: format!("note {id}"),
            })
            .collect();
        tree.apply(&notes, &[1]).unwrap();

        assert!(tree.get(&1).unwrap().is_none());
        assert_eq!(tree.len(), 2);
        let mut stored: Vec<Note> = tree.iter().collect::<CoralResult<_>>().unwrap();
        stored.sort_by_key(|n| n.id);
        assert_eq!(stored, notes);
    }
}
