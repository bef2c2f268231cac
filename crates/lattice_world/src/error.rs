//! World-level error types.

use lattice_component::{ComponentError, ErrorKind};

/// Errors reported by the world: entity store, query registry and scheduler.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// A component schema, instantiation or id-generator error.
    #[error(transparent)]
    Component(#[from] ComponentError),

    /// A world is already live in this process.
    #[error("a world already exists in this process")]
    AlreadyConstructed,

    /// The entity is unknown or no longer active.
    #[error("entity {0} doesn't exist")]
    EntityNotFound(String),

    /// The entity already holds a component of this type.
    #[error("entity {entity} already has component \"{component}\"")]
    DuplicateComponent { entity: String, component: String },

    /// The entity id generator kept yielding ids that are in use.
    #[error("entity id generator yielded {0} ids that already exist")]
    IdExhaustion(usize),

    #[error("query \"{0}\" already exists")]
    DuplicateQuery(String),

    #[error("query \"{0}\" doesn't exist")]
    QueryNotFound(String),

    /// The query name or its component list is malformed, or the query is
    /// the reserved global query.
    #[error("invalid query \"{name}\": {message}")]
    InvalidQuery { name: String, message: String },

    #[error("system \"{0}\" already exists")]
    DuplicateSystem(String),

    #[error("system {0} doesn't exist")]
    SystemNotFound(String),

    /// `clean` was called from inside a running system.
    #[error("cannot purge entities while systems are running")]
    PurgeDuringRun,
}

impl WorldError {
    /// Returns the taxonomy bucket of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Component(e) => e.kind(),
            Self::DuplicateQuery(_) | Self::DuplicateSystem(_) => ErrorKind::DuplicateName,
            Self::EntityNotFound(_) | Self::QueryNotFound(_) | Self::SystemNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::AlreadyConstructed | Self::InvalidQuery { .. } | Self::PurgeDuringRun => {
                ErrorKind::InvalidArgument
            }
            Self::DuplicateComponent { .. } => ErrorKind::InvariantViolation,
            Self::IdExhaustion(_) => ErrorKind::IdExhaustion,
        }
    }
}
