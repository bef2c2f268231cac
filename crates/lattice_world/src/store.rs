//! Entity store: authoritative storage for entities, their components, the
//! global component index, and the pending-destruction queue.
//!
//! The store never talks to the query registry; the [`World`](crate::World)
//! sequences store mutations and query notifications.

use std::collections::HashMap;

use lattice_component::{ComponentData, ComponentTypeId, Id, IdGenerator};
use slotmap::SlotMap;
use tracing::{debug, trace};

use crate::entity::{Component, Entity, EntityRecord, EntityRef, Lifecycle, LifecycleEvent};
use crate::error::WorldError;

/// How many times entity id generation is retried when the generator yields
/// an id that is already in use.
pub const MAX_ID_GENERATION_TRIES: usize = 100;

/// One entry of the global component index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub entity: Entity,
    pub component: Id,
}

/// An entity queued for purge, with the component types it held when it was
/// removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDestruction {
    pub entity: Entity,
    pub component_types: Vec<ComponentTypeId>,
}

#[derive(Debug)]
pub struct EntityStore {
    entities: SlotMap<Entity, EntityRecord>,
    /// External id → arena handle, for every stored entity.
    ids: HashMap<Id, Entity>,
    /// Component type → (entity, component id), in assignment order.
    component_index: HashMap<ComponentTypeId, Vec<IndexEntry>>,
    pending: Vec<PendingDestruction>,
    entity_ids: IdGenerator,
    component_ids: IdGenerator,
}

impl EntityStore {
    pub(crate) fn new(entity_ids: IdGenerator, component_ids: IdGenerator) -> Self {
        Self {
            entities: SlotMap::with_key(),
            ids: HashMap::new(),
            component_index: HashMap::new(),
            pending: Vec::new(),
            entity_ids,
            component_ids,
        }
    }

    // -- Readers --

    /// Returns `true` if the handle refers to a stored entity, active or
    /// pending purge.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains_key(entity)
    }

    /// Resolve an external id to its arena handle.
    #[must_use]
    pub fn lookup(&self, id: &Id) -> Option<Entity> {
        self.ids.get(id).copied()
    }

    /// Number of active entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities
            .values()
            .filter(|r| r.state.is_active())
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored entities, including those pending purge.
    #[must_use]
    pub fn stored_len(&self) -> usize {
        self.entities.len()
    }

    /// Iterate over active entities.
    pub fn iter(&self) -> impl Iterator<Item = EntityRef<'_>> {
        self.entities
            .iter()
            .filter(|(_, r)| r.state.is_active())
            .map(|(entity, r)| EntityRef::new(entity, r))
    }

    /// Every stored entity, including those pending purge.
    pub(crate) fn iter_stored(&self) -> impl Iterator<Item = EntityRef<'_>> {
        self.entities
            .iter()
            .map(|(entity, r)| EntityRef::new(entity, r))
    }

    /// Index entries for one component type, in assignment order.
    #[must_use]
    pub fn indexed(&self, ty: ComponentTypeId) -> &[IndexEntry] {
        self.component_index
            .get(&ty)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Entities removed but not yet purged.
    #[must_use]
    pub fn pending(&self) -> &[PendingDestruction] {
        &self.pending
    }

    pub(crate) fn record(&self, entity: Entity) -> Option<&EntityRecord> {
        self.entities.get(entity)
    }

    pub(crate) fn record_mut(&mut self, entity: Entity) -> Option<&mut EntityRecord> {
        self.entities.get_mut(entity)
    }

    // -- Mutation --

    /// Generate an entity id that is not in use.
    pub(crate) fn allocate_id(&mut self) -> Result<Id, WorldError> {
        for _ in 0..=MAX_ID_GENERATION_TRIES {
            let id = self.entity_ids.next_id()?;
            if !self.ids.contains_key(&id) {
                return Ok(id);
            }
            trace!(%id, "entity id already in use, retrying");
        }
        Err(WorldError::IdExhaustion(MAX_ID_GENERATION_TRIES))
    }

    /// Store a new active entity with its initial components.
    ///
    /// Validation happens before anything is stored, so a failure leaves the
    /// store untouched.
    pub(crate) fn insert(
        &mut self,
        id: Id,
        components: Vec<ComponentData>,
    ) -> Result<Entity, WorldError> {
        let mut seen = Vec::with_capacity(components.len());
        for data in &components {
            if seen.contains(&data.type_id()) {
                return Err(WorldError::DuplicateComponent {
                    entity: id.to_string(),
                    component: data.type_name().to_string(),
                });
            }
            seen.push(data.type_id());
        }

        let mut record = EntityRecord::new(id.clone());
        for data in components {
            let component_id = self.component_ids.next_id()?;
            record.components.push(Component::new(component_id, data));
        }

        let entity = self.entities.insert(record);
        self.ids.insert(id, entity);
        if let Some(record) = self.entities.get(entity) {
            for component in &record.components {
                self.component_index
                    .entry(component.type_id())
                    .or_default()
                    .push(IndexEntry {
                        entity,
                        component: component.id().clone(),
                    });
            }
        }
        Ok(entity)
    }

    /// Attach a component to an active entity and index it.
    pub(crate) fn attach(&mut self, entity: Entity, data: ComponentData) -> Result<Id, WorldError> {
        let record = match self.entities.get(entity) {
            Some(r) if r.state.is_active() => r,
            _ => return Err(WorldError::EntityNotFound(format!("{entity:?}"))),
        };
        if record.has_type(data.type_id()) {
            return Err(WorldError::DuplicateComponent {
                entity: record.id.to_string(),
                component: data.type_name().to_string(),
            });
        }

        let component_id = self.component_ids.next_id()?;
        let ty = data.type_id();
        if let Some(record) = self.entities.get_mut(entity) {
            record
                .components
                .push(Component::new(component_id.clone(), data));
        }
        self.component_index
            .entry(ty)
            .or_default()
            .push(IndexEntry {
                entity,
                component: component_id.clone(),
            });
        Ok(component_id)
    }

    /// Detach a component by id. Returns its type, or `None` if the entity
    /// does not hold it.
    pub(crate) fn detach(&mut self, entity: Entity, component_id: &Id) -> Option<ComponentTypeId> {
        let record = self.entities.get_mut(entity)?;
        let pos = record
            .components
            .iter()
            .position(|c| c.id() == component_id)?;
        let removed = record.components.remove(pos);
        let ty = removed.type_id();
        if let Some(entries) = self.component_index.get_mut(&ty) {
            entries.retain(|e| !(e.entity == entity && &e.component == component_id));
        }
        Some(ty)
    }

    /// Detach the component of a given type. Returns its id, or `None` if
    /// the entity does not hold the type.
    pub(crate) fn detach_type(&mut self, entity: Entity, ty: ComponentTypeId) -> Option<Id> {
        let component_id = self.entities.get(entity)?.of_type(ty)?.id().clone();
        self.detach(entity, &component_id).map(|_| component_id)
    }

    /// Move an active entity to `PendingPurge` and queue it. Storage is left
    /// untouched.
    pub(crate) fn mark_removed(&mut self, entity: Entity) -> bool {
        let Some(record) = self.entities.get_mut(entity) else {
            return false;
        };
        let Some(next) = record.state.transition(LifecycleEvent::Remove) else {
            return false;
        };
        record.state = next;
        self.pending.push(PendingDestruction {
            entity,
            component_types: record.component_types(),
        });
        debug!(entity = %record.id, "entity queued for purge");
        true
    }

    /// Take the pending-destruction queue, leaving it empty.
    pub(crate) fn take_pending(&mut self) -> Vec<PendingDestruction> {
        std::mem::take(&mut self.pending)
    }

    /// Erase a queued entity: its index entries, its id mapping, and its
    /// record.
    pub(crate) fn purge(&mut self, target: &PendingDestruction) -> bool {
        let Some(record) = self.entities.get(target.entity) else {
            return false;
        };
        if record.state.transition(LifecycleEvent::Purge) != Some(Lifecycle::Purged) {
            return false;
        }
        for ty in &target.component_types {
            if let Some(entries) = self.component_index.get_mut(ty) {
                entries.retain(|e| e.entity != target.entity);
            }
        }
        match self.entities.remove(target.entity) {
            Some(record) => {
                self.ids.remove(&record.id);
                debug!(entity = %record.id, "entity purged");
                true
            }
            None => false,
        }
    }

    /// Drop every entity, component, index entry and queued purge.
    pub(crate) fn clear(&mut self) {
        self.entities.clear();
        self.ids.clear();
        self.component_index.clear();
        self.pending.clear();
    }
}
