//! Resource classes, attribute classes and attribute definitions.
//!
//! A resource class declares attributes and may inherit from any number of
//! parent classes. Attribute names are unique across a class's whole hierarchy,
//! so every resource sees at most one attribute of a given name.

pub mod manager;
pub mod model;
pub(crate) mod state;

pub use manager::{CoralSchema, NewAttribute};
pub use model::{
    AttributeClass, AttributeDefinition, AttributeFlags, AttributeType, AttributeValue,
    ResourceClass, ResourceClassFlags, ResourceClassInheritance,
};
