//! Component identity and component data records.
//!
//! Components are schema-defined rather than Rust types, so an instance is a
//! type tag plus a JSON object payload. The tag is both the human-readable
//! type name and its [`ComponentTypeId`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ComponentError;
use crate::schema::ComponentFactory;

/// A unique identifier for a component type, derived from its string name
/// using the FNV-1a 64-bit hash algorithm.
///
/// The id is deterministic, so a type can be looked up by name without going
/// through the schema registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u64);

impl ComponentTypeId {
    /// FNV-1a 64-bit offset basis.
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

    /// FNV-1a 64-bit prime.
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    /// Compute the [`ComponentTypeId`] of a component type name.
    ///
    /// ```text
    /// hash = 0xcbf29ce484222325
    /// for each byte in name.as_bytes():
    ///     hash = hash XOR byte
    ///     hash = hash * 0x00000100000001b3
    /// ```
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }
}

impl std::fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Returns `true` if `name` is usable as a component type or capability name.
///
/// Names start with an ASCII letter, `$` or `_`, followed by any number of
/// ASCII letters, digits, `$` or `_`.
#[must_use]
pub fn is_valid_type_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '$' || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '$' || c == '_')
}

/// One component instance: a type tag plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentData {
    type_id: ComponentTypeId,
    type_name: Arc<str>,
    fields: Map<String, Value>,
}

impl ComponentData {
    /// Build a component record directly, without a registered schema.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::InvalidName`] if `type_name` is not a valid
    /// identifier.
    pub fn new(type_name: &str, fields: Map<String, Value>) -> Result<Self, ComponentError> {
        if !is_valid_type_name(type_name) {
            return Err(ComponentError::InvalidName(type_name.to_string()));
        }
        Ok(Self::from_parts(Arc::from(type_name), fields))
    }

    pub(crate) fn from_parts(type_name: Arc<str>, fields: Map<String, Value>) -> Self {
        Self {
            type_id: ComponentTypeId::from_name(&type_name),
            type_name,
            fields,
        }
    }

    /// Returns the component type id.
    #[must_use]
    pub fn type_id(&self) -> ComponentTypeId {
        self.type_id
    }

    /// Returns the component type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns all fields.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Returns all fields mutably.
    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }

    /// Returns a single field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Look up a nested value by JSON pointer, e.g. `"/position/x"`.
    #[must_use]
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        let rest = pointer.strip_prefix('/')?;
        let (head, tail) = match rest.split_once('/') {
            Some((head, tail)) => (head, Some(tail)),
            None => (rest, None),
        };
        let value = self.fields.get(&head.replace("~1", "/").replace("~0", "~"))?;
        match tail {
            Some(tail) => value.pointer(&format!("/{tail}")),
            None => Some(value),
        }
    }

    /// Set a single field, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(field.into(), value)
    }

    /// Returns the fields as a JSON object value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Something that can be assigned to an entity: either a ready instance or a
/// factory that builds one from its defaults.
#[derive(Debug, Clone)]
pub enum ComponentSource {
    /// A fully built instance.
    Data(ComponentData),
    /// A factory, instantiated with defaults on assignment.
    Factory(ComponentFactory),
}

impl ComponentSource {
    /// Resolve to a component instance.
    #[must_use]
    pub fn resolve(self) -> ComponentData {
        match self {
            Self::Data(data) => data,
            Self::Factory(factory) => factory.create(),
        }
    }
}

impl From<ComponentData> for ComponentSource {
    fn from(data: ComponentData) -> Self {
        Self::Data(data)
    }
}

impl From<ComponentFactory> for ComponentSource {
    fn from(factory: ComponentFactory) -> Self {
        Self::Factory(factory)
    }
}

impl From<&ComponentFactory> for ComponentSource {
    fn from(factory: &ComponentFactory) -> Self {
        Self::Factory(factory.clone())
    }
}
