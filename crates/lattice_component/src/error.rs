//! Component-layer error types and the error taxonomy shared by the runtime.

/// Broad classification of every failure the runtime reports.
///
/// Both [`ComponentError`] and the world crate's error type map onto these
/// kinds, so callers can branch on the category without matching every
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An entity, query, system or schema was registered under a used name.
    DuplicateName,
    /// A lookup by id, name or type found nothing.
    NotFound,
    /// Malformed registration input.
    InvalidArgument,
    /// A structural invariant would be broken (e.g. a second component of a
    /// type the entity already holds).
    InvariantViolation,
    /// The id generator could not produce a free id within the retry bound.
    IdExhaustion,
}

/// Errors raised while defining or instantiating components.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    /// The type name does not match the identifier pattern.
    #[error("invalid or missing component name: {0:?}")]
    InvalidName(String),

    /// A schema with this name is already registered.
    #[error("component \"{0}\" already exists")]
    DuplicateComponent(String),

    /// A component of a type with no registered schema was dispatched on.
    #[error("no component schema defined for \"{0}\"")]
    UnknownComponent(String),

    /// `instantiate` was asked for a type that was never defined.
    #[error("cannot instantiate undefined component \"{0}\"")]
    UndefinedComponent(String),

    /// The schema defaults are not a JSON object.
    #[error("invalid defaults for component \"{component}\": expected a JSON object, got {found}")]
    InvalidDefaults {
        component: String,
        found: &'static str,
    },

    /// Instance props were supplied but are not a JSON object.
    #[error("invalid props for component \"{component}\": expected a JSON object, got {found}")]
    InvalidProps {
        component: String,
        found: &'static str,
    },

    /// A capability name is not a valid identifier.
    #[error("invalid capability name {method:?} on component \"{component}\"")]
    InvalidCapability { component: String, method: String },

    /// The component type has no capability with this name.
    #[error("component \"{component}\" has no capability \"{method}\"")]
    UnknownCapability { component: String, method: String },

    /// A custom id generator failed its self-test or produced a bad value.
    #[error("invalid id generator: {0}")]
    InvalidGenerator(String),
}

impl ComponentError {
    /// Returns the taxonomy bucket of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateComponent(_) => ErrorKind::DuplicateName,
            Self::UnknownComponent(_) | Self::UnknownCapability { .. } => ErrorKind::NotFound,
            Self::InvalidName(_)
            | Self::UndefinedComponent(_)
            | Self::InvalidDefaults { .. }
            | Self::InvalidProps { .. }
            | Self::InvalidCapability { .. }
            | Self::InvalidGenerator(_) => ErrorKind::InvalidArgument,
        }
    }
}

/// Short human-readable name of a JSON value's kind, for error messages.
pub(crate) fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
