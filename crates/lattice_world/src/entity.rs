//! Entities, their lifecycle, and the handles used to inspect and mutate them.
//!
//! An [`Entity`] is a generational arena handle: cheap to copy, stable for
//! the entity's lifetime, and never reused for a different entity while a
//! stale copy could still observe it. The generator-assigned [`Id`] is the
//! external identity; the world maps one to the other.

use std::ops::Deref;

use lattice_component::{ComponentData, ComponentSource, ComponentTypeId, Id};

use crate::error::WorldError;
use crate::store::EntityStore;
use crate::world::World;

slotmap::new_key_type! {
    /// Arena handle of an entity.
    pub struct Entity;
}

/// Where an entity is in its removal protocol.
///
/// Removal is two-phase: [`World::remove_entity`] moves an entity to
/// `PendingPurge`, and only [`World::clean`] erases it from storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Active,
    PendingPurge,
    Purged,
}

/// An input to [`Lifecycle::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// The entity was removed by the application.
    Remove,
    /// A clean pass reached the entity.
    Purge,
}

impl Lifecycle {
    /// Returns the next state, or `None` if the event does not apply.
    #[must_use]
    pub fn transition(self, event: LifecycleEvent) -> Option<Self> {
        match (self, event) {
            (Self::Active, LifecycleEvent::Remove) => Some(Self::PendingPurge),
            (Self::PendingPurge, LifecycleEvent::Purge) => Some(Self::Purged),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

/// A component instance owned by an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    id: Id,
    data: ComponentData,
}

impl Component {
    pub(crate) fn new(id: Id, data: ComponentData) -> Self {
        Self { id, data }
    }

    /// The store-assigned component id.
    #[must_use]
    pub fn id(&self) -> &Id {
        &self.id
    }

    #[must_use]
    pub fn type_id(&self) -> ComponentTypeId {
        self.data.type_id()
    }

    #[must_use]
    pub fn data(&self) -> &ComponentData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut ComponentData {
        &mut self.data
    }
}

impl Deref for Component {
    type Target = ComponentData;

    fn deref(&self) -> &ComponentData {
        &self.data
    }
}

/// Storage record of a single entity.
#[derive(Debug)]
pub(crate) struct EntityRecord {
    pub(crate) id: Id,
    pub(crate) state: Lifecycle,
    /// At most one component per type, in assignment order.
    pub(crate) components: Vec<Component>,
}

impl EntityRecord {
    pub(crate) fn new(id: Id) -> Self {
        Self {
            id,
            state: Lifecycle::Active,
            components: Vec::new(),
        }
    }

    pub(crate) fn has_type(&self, ty: ComponentTypeId) -> bool {
        self.components.iter().any(|c| c.type_id() == ty)
    }

    pub(crate) fn of_type(&self, ty: ComponentTypeId) -> Option<&Component> {
        self.components.iter().find(|c| c.type_id() == ty)
    }

    pub(crate) fn of_type_mut(&mut self, ty: ComponentTypeId) -> Option<&mut Component> {
        self.components.iter_mut().find(|c| c.type_id() == ty)
    }

    pub(crate) fn component_types(&self) -> Vec<ComponentTypeId> {
        self.components.iter().map(|c| c.type_id()).collect()
    }
}

/// Anything that identifies an entity: an arena handle or an external id.
pub trait EntitySelector {
    /// Resolve to an arena handle, whatever the entity's lifecycle state.
    fn select(&self, store: &EntityStore) -> Option<Entity>;

    /// Printable form for log lines and error messages.
    fn describe(&self) -> String;
}

impl EntitySelector for Entity {
    fn select(&self, store: &EntityStore) -> Option<Entity> {
        store.contains(*self).then_some(*self)
    }

    fn describe(&self) -> String {
        format!("{self:?}")
    }
}

impl EntitySelector for Id {
    fn select(&self, store: &EntityStore) -> Option<Entity> {
        store.lookup(self)
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl EntitySelector for u64 {
    fn select(&self, store: &EntityStore) -> Option<Entity> {
        store.lookup(&Id::Num(*self))
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl EntitySelector for str {
    fn select(&self, store: &EntityStore) -> Option<Entity> {
        store.lookup(&Id::from(self))
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl<T: EntitySelector + ?Sized> EntitySelector for &T {
    fn select(&self, store: &EntityStore) -> Option<Entity> {
        (**self).select(store)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Read-only view of an entity.
#[derive(Debug, Clone, Copy)]
pub struct EntityRef<'w> {
    entity: Entity,
    record: &'w EntityRecord,
}

impl<'w> EntityRef<'w> {
    pub(crate) fn new(entity: Entity, record: &'w EntityRecord) -> Self {
        Self { entity, record }
    }

    #[must_use]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    #[must_use]
    pub fn id(&self) -> &'w Id {
        &self.record.id
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.record.state
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.record.state.is_active()
    }

    /// Returns the component of the named type.
    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<&'w Component> {
        self.record.of_type(ComponentTypeId::from_name(type_name))
    }

    #[must_use]
    pub fn get_by_type(&self, ty: ComponentTypeId) -> Option<&'w Component> {
        self.record.of_type(ty)
    }

    /// Returns the component with the given component id.
    #[must_use]
    pub fn component(&self, component_id: &Id) -> Option<&'w Component> {
        self.record.components.iter().find(|c| c.id() == component_id)
    }

    #[must_use]
    pub fn has(&self, type_name: &str) -> bool {
        self.record.has_type(ComponentTypeId::from_name(type_name))
    }

    /// All components, in assignment order.
    #[must_use]
    pub fn components(&self) -> &'w [Component] {
        &self.record.components
    }

    pub fn component_types(&self) -> impl Iterator<Item = ComponentTypeId> + 'w {
        self.record.components.iter().map(|c| c.type_id())
    }
}

/// Exclusive view of an active entity; mutations are routed through the
/// world so query membership stays current.
#[derive(Debug)]
pub struct EntityMut<'w> {
    world: &'w mut World,
    entity: Entity,
    id: Id,
}

impl<'w> EntityMut<'w> {
    pub(crate) fn new(world: &'w mut World, entity: Entity, id: Id) -> Self {
        Self { world, entity, id }
    }

    #[must_use]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    #[must_use]
    pub fn id(&self) -> &Id {
        &self.id
    }

    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<&Component> {
        self.world
            .store()
            .record(self.entity)
            .and_then(|r| r.of_type(ComponentTypeId::from_name(type_name)))
    }

    /// Mutable access to a component's data. Field edits never change query
    /// membership, so they need no notification.
    pub fn get_mut(&mut self, type_name: &str) -> Option<&mut ComponentData> {
        self.world
            .store_mut()
            .record_mut(self.entity)
            .and_then(|r| r.of_type_mut(ComponentTypeId::from_name(type_name)))
            .map(Component::data_mut)
    }

    #[must_use]
    pub fn has(&self, type_name: &str) -> bool {
        self.get(type_name).is_some()
    }

    /// Assign a component; see [`World::assign_component`].
    ///
    /// # Errors
    ///
    /// Fails if the entity already holds the type.
    pub fn add(&mut self, component: impl Into<ComponentSource>) -> Result<Id, WorldError> {
        self.world.assign_component(self.entity, component)
    }

    /// Remove a component by id; see [`World::remove_component`].
    ///
    /// # Errors
    ///
    /// Fails only if the entity is no longer active.
    pub fn remove(&mut self, component_id: &Id) -> Result<bool, WorldError> {
        self.world.remove_component(self.entity, component_id)
    }

    /// Remove the component of the named type, if present.
    ///
    /// # Errors
    ///
    /// Fails only if the entity is no longer active.
    pub fn remove_type(&mut self, type_name: &str) -> Result<bool, WorldError> {
        self.world.remove_component_of_type(self.entity, type_name)
    }

    /// Downgrade to a read-only view.
    #[must_use]
    pub fn view(&self) -> Option<EntityRef<'_>> {
        self.world
            .store()
            .record(self.entity)
            .map(|r| EntityRef::new(self.entity, r))
    }
}
