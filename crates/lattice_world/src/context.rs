//! Per-run execution context provided to system callbacks.

use crate::entity::{Entity, EntityRef};
use crate::scheduler::SystemHandle;
use crate::world::World;

/// Context provided to a system callback on each scheduler run.
///
/// Holds the snapshot of the system's query membership taken just before the
/// callback started, along with the run's timing. Membership changes the
/// callback makes are visible through the world immediately but do not alter
/// the snapshot.
#[derive(Debug)]
pub struct SystemContext<'w> {
    world: &'w mut World,
    system: SystemHandle,
    entities: Vec<Entity>,
    /// Time passed to [`World::run`].
    pub time: f64,
    /// Delta passed to [`World::run`].
    pub delta: f64,
}

impl<'w> SystemContext<'w> {
    pub(crate) fn new(
        world: &'w mut World,
        system: SystemHandle,
        entities: Vec<Entity>,
        time: f64,
        delta: f64,
    ) -> Self {
        Self {
            world,
            system,
            entities,
            time,
            delta,
        }
    }

    /// The system being run.
    #[must_use]
    pub fn system(&self) -> SystemHandle {
        self.system
    }

    /// The query snapshot.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Read an active entity, from the snapshot or anywhere else in the
    /// world. Returns `None` for entities removed since the snapshot was
    /// taken.
    #[must_use]
    pub fn entity(&self, entity: Entity) -> Option<EntityRef<'_>> {
        self.world.entity_view(entity)
    }

    /// Views of the snapshot entities that are still active.
    pub fn iter(&self) -> impl Iterator<Item = EntityRef<'_>> {
        self.entities
            .iter()
            .filter_map(|&e| self.world.entity_view(e))
    }

    #[must_use]
    pub fn world(&self) -> &World {
        self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        self.world
    }
}
