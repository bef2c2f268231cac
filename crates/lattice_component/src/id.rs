//! Entity and component identifiers and their generators.
//!
//! An [`Id`] is either a non-negative integer or a string: the two kinds of
//! value an id generator may yield. The world keeps one [`IdGenerator`] for
//! entities and one for components.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ComponentError, value_kind};

/// An entity or component identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    /// A numeric id, as produced by the auto-increment generator.
    Num(u64),
    /// A textual id, as produced by the UUID generator or custom generators.
    Str(String),
}

impl Id {
    /// Interpret a generator's output as an id.
    ///
    /// Only non-negative integers and strings qualify.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(Self::Num),
            Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }

    /// Returns the numeric id, if this is one.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Str(_) => None,
        }
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for Id {
    fn from(value: u64) -> Self {
        Self::Num(value)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Produces fresh ids for entities or components.
///
/// Uniqueness against live ids is enforced by the caller (the entity store
/// retries on collision); generators only promise not to repeat themselves
/// back to back.
pub enum IdGenerator {
    /// Monotonically increasing integers starting at `next`.
    Auto { next: u64 },
    /// Random v4 UUID strings.
    Uuid,
    /// A caller-supplied function, validated by [`IdGenerator::custom`].
    Custom(Box<dyn FnMut() -> Value>),
}

impl IdGenerator {
    /// Auto-increment generator starting at 1.
    #[must_use]
    pub fn auto() -> Self {
        Self::Auto { next: 1 }
    }

    /// Auto-increment generator starting at `start`.
    #[must_use]
    pub fn auto_from(start: u64) -> Self {
        Self::Auto { next: start }
    }

    /// Random UUID generator.
    #[must_use]
    pub fn uuid() -> Self {
        Self::Uuid
    }

    /// Wrap a custom generator function after self-testing it.
    ///
    /// The function is invoked twice. It is rejected if either call returns
    /// `null` or a value that is neither a string nor a non-negative integer,
    /// or if both calls return the same value.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::InvalidGenerator`] if the self-test fails.
    pub fn custom<F>(mut generator: F) -> Result<Self, ComponentError>
    where
        F: FnMut() -> Value + 'static,
    {
        let first = checked(generator())?;
        let second = checked(generator())?;
        if first == second {
            return Err(ComponentError::InvalidGenerator(
                "generator must return unique values on subsequent calls".into(),
            ));
        }
        Ok(Self::Custom(Box::new(generator)))
    }

    /// Produce the next id.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::InvalidGenerator`] if a custom generator
    /// yields a value that is not a valid id, or if the auto-increment
    /// counter cannot advance past `u64::MAX`.
    pub fn next_id(&mut self) -> Result<Id, ComponentError> {
        match self {
            Self::Auto { next } => {
                let id = *next;
                *next = id.checked_add(1).ok_or_else(|| {
                    ComponentError::InvalidGenerator("auto-increment ids exhausted".into())
                })?;
                Ok(Id::Num(id))
            }
            Self::Uuid => Ok(Id::Str(Uuid::new_v4().to_string())),
            Self::Custom(generator) => checked(generator()),
        }
    }
}

fn checked(value: Value) -> Result<Id, ComponentError> {
    if value.is_null() {
        return Err(ComponentError::InvalidGenerator(
            "generator must return a value".into(),
        ));
    }
    Id::from_value(&value).ok_or_else(|| {
        ComponentError::InvalidGenerator(format!(
            "generator must return either a string or a non-negative integer, got {}",
            value_kind(&value)
        ))
    })
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::auto()
    }
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto { next } => f.debug_struct("Auto").field("next", next).finish(),
            Self::Uuid => f.write_str("Uuid"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
