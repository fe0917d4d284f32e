//! Schema records: attribute classes, attribute definitions, resource classes
//! and the inheritance edges between classes.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::BitOr;

use chrono::{DateTime, Utc};

use crate::entity::{
    AttributeClassId, AttributeDefinitionId, PermissionId, ResourceClassId, ResourceId, RoleId,
    SubjectId,
};
use crate::error::EntityKind;
use crate::traits::{CoralRecord, Entity};

/// The value types an attribute class can describe.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    bincode::Encode,
    bincode::Decode,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum AttributeType {
    String,
    Text,
    Integer,
    Long,
    Boolean,
    Date,
    Resource,
    Subject,
    Role,
    Permission,
}

/// A typed attribute value stored on a resource.
#[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
pub enum AttributeValue {
    String(String),
    Text(String),
    Integer(i32),
    Long(i64),
    Boolean(bool),
    Date(#[bincode(with_serde)] DateTime<Utc>),
    Resource(ResourceId),
    Subject(SubjectId),
    Role(RoleId),
    Permission(PermissionId),
}

impl AttributeValue {
    pub fn value_type(&self) -> AttributeType {
        match self {
            AttributeValue::String(_) => AttributeType::String,
            AttributeValue::Text(_) => AttributeType::Text,
            AttributeValue::Integer(_) => AttributeType::Integer,
            AttributeValue::Long(_) => AttributeType::Long,
            AttributeValue::Boolean(_) => AttributeType::Boolean,
            AttributeValue::Date(_) => AttributeType::Date,
            AttributeValue::Resource(_) => AttributeType::Resource,
            AttributeValue::Subject(_) => AttributeType::Subject,
            AttributeValue::Role(_) => AttributeType::Role,
            AttributeValue::Permission(_) => AttributeType::Permission,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) | AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(v) => Some(i64::from(*v)),
            AttributeValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) | AttributeValue::Text(s) => write!(f, "{s}"),
            AttributeValue::Integer(v) => write!(f, "{v}"),
            AttributeValue::Long(v) => write!(f, "{v}"),
            AttributeValue::Boolean(v) => write!(f, "{v}"),
            AttributeValue::Date(v) => write!(f, "{}", v.to_rfc3339()),
            AttributeValue::Resource(id) => write!(f, "resource:{id}"),
            AttributeValue::Subject(id) => write!(f, "subject:{id}"),
            AttributeValue::Role(id) => write!(f, "role:{id}"),
            AttributeValue::Permission(id) => write!(f, "permission:{id}"),
        }
    }
}

macro_rules! flag_set {
    ($(#[$meta:meta])* $name:ident { $($(#[$fmeta:meta])* $flag:ident = $bit:expr),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, bincode::Encode, bincode::Decode)]
        pub struct $name(u32);

        impl $name {
            pub const NONE: Self = Self(0);
            $($(#[$fmeta])* pub const $flag: Self = Self($bit);)*

            pub fn bits(self) -> u32 {
                self.0
            }

            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn with(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }

            pub fn without(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                self.with(rhs)
            }
        }
    };
}

flag_set!(
    /// Behavioural flags of an attribute definition.
    AttributeFlags {
        /// Every instance must carry a value
        REQUIRED = 1,
        /// Value is fixed at creation time
        READONLY = 2,
        /// Defined by Coral itself
        BUILTIN = 4,
        INDEXABLE = 8,
    }
);

flag_set!(
    /// Behavioural flags of a resource class.
    ResourceClassFlags {
        /// No resources may be created with this class
        ABSTRACT = 1,
        /// The class may not be used as a parent class
        FINAL = 2,
        BUILTIN = 4,
    }
);

macro_rules! impl_identity {
    ($name:ident) => {
        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.id.hash(state);
            }
        }
    };
}

/// Describes a value type attributes can be declared with.
#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub struct AttributeClass {
    pub(crate) id: AttributeClassId,
    pub(crate) name: String,
    pub(crate) value_type: AttributeType,
    /// Created at bootstrap; cannot be renamed or deleted
    pub(crate) builtin: bool,
}

impl AttributeClass {
    pub fn new(id: AttributeClassId, name: impl Into<String>, value_type: AttributeType) -> Self {
        Self {
            id,
            name: name.into(),
            value_type,
            builtin: false,
        }
    }

    /// The bootstrap class of `value_type`, named after it
    pub(crate) fn builtin(id: AttributeClassId, value_type: AttributeType) -> Self {
        Self {
            builtin: true,
            ..Self::new(id, value_type.to_string(), value_type)
        }
    }

    pub fn id(&self) -> AttributeClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> AttributeType {
        self.value_type
    }

    pub fn is_builtin(&self) -> bool {
        self.builtin
    }
}

impl_identity!(AttributeClass);

impl CoralRecord for AttributeClass {
    const TREE: &'static str = "attribute_classes";
    type Key = AttributeClassId;

    fn record_key(&self) -> Self::Key {
        self.id
    }
}

impl Entity for AttributeClass {
    type Id = AttributeClassId;
    const KIND: EntityKind = EntityKind::AttributeClass;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

/// A named, typed slot declared by a resource class.
#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub struct AttributeDefinition {
    pub(crate) id: AttributeDefinitionId,
    pub(crate) name: String,
    pub(crate) attribute_class: AttributeClassId,
    pub(crate) declaring_class: ResourceClassId,
    pub(crate) flags: AttributeFlags,
    pub(crate) domain: Option<String>,
}

impl AttributeDefinition {
    pub fn id(&self) -> AttributeDefinitionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute_class(&self) -> AttributeClassId {
        self.attribute_class
    }

    pub fn declaring_class(&self) -> ResourceClassId {
        self.declaring_class
    }

    pub fn flags(&self) -> AttributeFlags {
        self.flags
    }

    /// Free-form constraint on the values, interpreted by applications
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn is_required(&self) -> bool {
        self.flags.contains(AttributeFlags::REQUIRED)
    }

    pub fn is_readonly(&self) -> bool {
        self.flags.contains(AttributeFlags::READONLY)
    }
}

impl_identity!(AttributeDefinition);

impl CoralRecord for AttributeDefinition {
    const TREE: &'static str = "attribute_definitions";
    type Key = AttributeDefinitionId;

    fn record_key(&self) -> Self::Key {
        self.id
    }
}

/// The type of a resource.
#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub struct ResourceClass {
    pub(crate) id: ResourceClassId,
    pub(crate) name: String,
    pub(crate) handler: String,
    pub(crate) flags: ResourceClassFlags,
}

impl ResourceClass {
    pub fn new(
        id: ResourceClassId,
        name: impl Into<String>,
        handler: impl Into<String>,
        flags: ResourceClassFlags,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            handler: handler.into(),
            flags,
        }
    }

    pub fn id(&self) -> ResourceClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the application component handling resources of this class
    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn flags(&self) -> ResourceClassFlags {
        self.flags
    }

    pub fn is_abstract(&self) -> bool {
        self.flags.contains(ResourceClassFlags::ABSTRACT)
    }

    pub fn is_final(&self) -> bool {
        self.flags.contains(ResourceClassFlags::FINAL)
    }
}

impl_identity!(ResourceClass);

impl CoralRecord for ResourceClass {
    const TREE: &'static str = "resource_classes";
    type Key = ResourceClassId;

    fn record_key(&self) -> Self::Key {
        self.id
    }
}

impl Entity for ResourceClass {
    type Id = ResourceClassId;
    const KIND: EntityKind = EntityKind::ResourceClass;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

/// `child` inherits the attributes and permissions of `parent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, bincode::Encode, bincode::Decode)]
pub struct ResourceClassInheritance {
    pub parent: ResourceClassId,
    pub child: ResourceClassId,
}

impl CoralRecord for ResourceClassInheritance {
    const TREE: &'static str = "resource_class_inheritance";
    type Key = (ResourceClassId, ResourceClassId);

    fn record_key(&self) -> Self::Key {
        (self.parent, self.child)
    }
}
