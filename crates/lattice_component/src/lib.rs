//! # lattice_component
//!
//! The "C" in ECS. Defines what a component is, how component schemas are
//! registered, and how component instances are built from them.
//!
//! This crate provides:
//!
//! - [`ComponentTypeId`]: FNV-1a hash of a component type name.
//! - [`ComponentData`]: a tagged, JSON-object payload for one component.
//! - [`ComponentRegistry`]: schema registration, instantiation and the
//!   capability dispatch table.
//! - [`ComponentFactory`]: a cheap handle that builds instances of one type.
//! - [`Id`] / [`IdGenerator`]: pluggable entity and component identifiers.
//! - [`ComponentError`] / [`ErrorKind`]: the shared error taxonomy.

pub mod component;
pub mod error;
pub mod id;
pub mod schema;

pub use component::{ComponentData, ComponentSource, ComponentTypeId, is_valid_type_name};
pub use error::{ComponentError, ErrorKind};
pub use id::{Id, IdGenerator};
pub use schema::{
    Capability, ComponentDefinition, ComponentFactory, ComponentRegistry, ComponentSchema,
};
