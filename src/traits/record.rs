use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::error::EntityKind;

/// A record persisted in its own Sled tree.
///
/// Records are stored bincode-encoded under the encoding of [`CoralRecord::record_key`].
/// Join records (assignments, associations) use a tuple of ids as their key.
pub trait CoralRecord:
    bincode::Encode + bincode::Decode<()> + Clone + Debug + Send + Sync + 'static
{
    /// Name of the tree holding records of this type
    const TREE: &'static str;

    /// Key under which the record is stored
    type Key: bincode::Encode + Ord + Hash + Clone + Debug + Send + Sync + 'static;

    fn record_key(&self) -> Self::Key;
}

/// A named entity with a numeric id.
///
/// Names are unique within one entity type and ids never change.
pub trait Entity: CoralRecord {
    type Id: Copy + Eq + Ord + Hash + Display + Debug + Send + Sync + 'static;

    const KIND: EntityKind;

    fn id(&self) -> Self::Id;

    fn name(&self) -> &str;

    fn set_name(&mut self, name: String);
}
