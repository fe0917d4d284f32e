use thiserror::Error;

pub type CoralResult<T> = Result<T, CoralError>;

/// The kinds of entity Coral keeps, used to label lookup and integrity errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    Subject,
    Role,
    Permission,
    Resource,
    ResourceClass,
    AttributeClass,
    AttributeDefinition,
    RoleImplication,
    RoleAssignment,
    PermissionAssociation,
    PermissionAssignment,
    ResourceClassInheritance,
}

#[derive(Error, Debug)]
pub enum CoralError {
    #[error("{kind} {key} does not exist")]
    EntityDoesNotExist { kind: EntityKind, key: String },

    #[error("{kind} {name} already exists")]
    EntityExists { kind: EntityKind, name: String },

    #[error("{kind} {name} is in use: {reason}")]
    EntityInUse {
        kind: EntityKind,
        name: String,
        reason: String,
    },

    #[error("a value is required for attribute {attribute} of class {class}")]
    ValueRequired { attribute: String, class: String },

    #[error("security violation: {0}")]
    Security(String),

    #[error("circular dependency: {0}")]
    CircularDependency(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("There was a conversion Error")]
    Conversion(#[from] EncodingDecodingError),

    #[error("There was an error with the Sled database")]
    Database(#[from] sled::Error),

    #[error("event bridge error: {0}")]
    Bridge(String),
}

impl CoralError {
    pub(crate) fn missing(kind: EntityKind, key: impl ToString) -> Self {
        Self::EntityDoesNotExist {
            kind,
            key: key.to_string(),
        }
    }

    pub(crate) fn exists(kind: EntityKind, name: impl ToString) -> Self {
        Self::EntityExists {
            kind,
            name: name.to_string(),
        }
    }

    pub(crate) fn in_use(kind: EntityKind, name: impl ToString, reason: impl Into<String>) -> Self {
        Self::EntityInUse {
            kind,
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodingDecodingError {
    #[error("There was an error encoding type")]
    Encoding(#[from] bincode::error::EncodeError),
    #[error("There was an error decoding type")]
    Decoding(#[from] bincode::error::DecodeError),
}

/// Violations of the session thread-affinity contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session is owned by another thread")]
    WrongThread,
    #[error("another session is current on this thread")]
    NotCurrent,
    #[error("session is closed")]
    Closed,
}

impl From<bincode::error::EncodeError> for CoralError {
    fn from(err: bincode::error::EncodeError) -> Self {
        CoralError::Conversion(EncodingDecodingError::Encoding(err))
    }
}

impl From<bincode::error::DecodeError> for CoralError {
    fn from(err: bincode::error::DecodeError) -> Self {
        CoralError::Conversion(EncodingDecodingError::Decoding(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_entity_kind() {
        let err = CoralError::missing(EntityKind::ResourceClass, 42);
        assert_eq!(err.to_string(), "resource_class 42 does not exist");

        let err = CoralError::exists(EntityKind::Subject, "alice");
        assert_eq!(err.to_string(), "subject alice already exists");
    }

    #[test]
    fn test_session_errors_are_transparent() {
        let err: CoralError = SessionError::WrongThread.into();
        assert_eq!(err.to_string(), "session is owned by another thread");
    }
}
