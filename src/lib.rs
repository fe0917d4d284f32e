//! # Coral
//!
//! An object-relational resource store: typed resources arranged in a tree, a
//! schema of resource classes with inherited attributes, a role based security
//! model, and an event whiteboard that reports every change.
//!
//! ## Features
//!
//! - **Schema**: resource classes with multiple inheritance and typed,
//!   flagged attribute definitions
//! - **Security**: subjects, roles with implication, permissions associated
//!   with classes and granted on resources, optionally down the tree
//! - **Store**: a resource tree addressed by id or path, persisted in Sled
//! - **Events**: anchored listeners on local, inbound, outbound and global
//!   whiteboards, with a bincode bridge to remote instances
//! - **Sessions**: pooled per principal and bound to the thread that
//!   borrowed them
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use coral::prelude::*;
//!
//! let coral = Coral::temp()?;
//! let session = coral.root_session()?;
//!
//! let folder = session
//!     .schema()
//!     .create_resource_class("folder", "folders", ResourceClassFlags::NONE)?;
//! let root = session.store().root_resource()?;
//! let docs = session
//!     .store()
//!     .create_resource("docs", root.id(), folder.id(), BTreeMap::new())?;
//!
//! assert_eq!(session.store().path(docs.id())?, "/docs");
//! # Ok::<(), coral::CoralError>(())
//! ```

pub mod config;
pub mod databases;
pub mod entity;
pub mod error;
pub mod event;
pub mod prelude;
pub mod schema;
pub mod security;
pub mod session;
pub(crate) mod state;
pub mod store;
pub mod traits;
pub mod utils;

pub use config::CoralConfig;
pub use error::{CoralError, CoralResult};
pub use session::{Coral, CoralSession};
pub use state::{NODE_CLASS, ROOT_RESOURCE};
