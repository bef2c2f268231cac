//! Entity store, incremental query registry and system scheduler.
//!
//! A [`World`] is the single owning context: create one per process, define
//! component schemas, register queries and systems, populate entities, then
//! drive it by calling [`World::run`] followed by [`World::clean`] once per
//! tick.
//!
//! ```no_run
//! use lattice_component::ComponentDefinition;
//! use lattice_world::{World, WorldConfig};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), lattice_world::WorldError> {
//! let config = WorldConfig::new()
//!     .with_component(ComponentDefinition::new("health", json!({"value": 100})));
//! let mut world = World::new(config)?;
//!
//! let living = world.register_query("living", ["health"])?;
//! world.register_system("regen", living, |ctx| {
//!     for entity in ctx.entities().to_vec() {
//!         if let Ok(mut e) = ctx.world_mut().entity_mut(entity) {
//!             if let Some(health) = e.get_mut("health") {
//!                 health.set("value", json!(100));
//!             }
//!         }
//!     }
//! })?;
//!
//! let health = world.components().factory("health");
//! world.create_entity(health)?;
//! world.run(0.0, 0.016);
//! world.clean()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod query;
pub mod scheduler;
pub mod store;
pub mod world;

pub use config::WorldConfig;
pub use context::SystemContext;
pub use entity::{Component, Entity, EntityMut, EntityRef, EntitySelector, Lifecycle, LifecycleEvent};
pub use error::WorldError;
pub use query::{GLOBAL_QUERY, Query, QueryHandle, QueryRegistry};
pub use scheduler::{Scheduler, System, SystemFn, SystemHandle};
pub use store::{EntityStore, IndexEntry, MAX_ID_GENERATION_TRIES, PendingDestruction};
pub use world::World;
