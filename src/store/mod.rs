//! The resource tree.
//!
//! Every resource has exactly one parent except the root, which is created
//! when a database is bootstrapped and can be neither moved nor deleted.
//! Resources are addressed by id or by slash separated path; sibling names are
//! not required to be unique.

pub mod manager;
pub mod model;
pub(crate) mod state;

pub use manager::{CoralStore, PATH_SEPARATOR};
pub use model::Resource;
