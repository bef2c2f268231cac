//! The owning world context.
//!
//! A [`World`] owns the component registry, the entity store, the query
//! registry and the scheduler, and sequences every mutation across them so
//! query membership always reflects the components entities hold. At most one
//! world is live per process.

use std::sync::atomic::{AtomicBool, Ordering};

use lattice_component::{
    ComponentData, ComponentDefinition, ComponentFactory, ComponentRegistry, ComponentSource,
    ComponentTypeId, Id,
};
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::config::WorldConfig;
use crate::context::SystemContext;
use crate::entity::{Entity, EntityMut, EntityRef, EntitySelector};
use crate::error::WorldError;
use crate::query::{Query, QueryHandle, QueryRegistry};
use crate::scheduler::{Scheduler, SystemHandle};
use crate::store::EntityStore;

/// Set while a world is live.
static WORLD_LIVE: AtomicBool = AtomicBool::new(false);

#[derive(Debug)]
pub struct World {
    components: ComponentRegistry,
    store: EntityStore,
    queries: QueryRegistry,
    scheduler: Scheduler,
    /// Nesting depth of [`World::run`].
    running: u32,
}

impl World {
    /// Create the process's world and define the configured components.
    ///
    /// # Errors
    ///
    /// - [`WorldError::AlreadyConstructed`] if another world is live.
    /// - Any error defining the configured components.
    pub fn new(config: WorldConfig) -> Result<Self, WorldError> {
        if WORLD_LIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(WorldError::AlreadyConstructed);
        }

        let WorldConfig {
            entity_ids,
            component_ids,
            components,
        } = config;
        let mut world = Self {
            components: ComponentRegistry::new(),
            store: EntityStore::new(entity_ids, component_ids),
            queries: QueryRegistry::new(),
            scheduler: Scheduler::new(),
            running: 0,
        };
        world.components.define_all(components)?;

        info!(components = world.components.len(), "world created");
        Ok(world)
    }

    // -- Components --

    /// Register a component schema.
    ///
    /// # Errors
    ///
    /// See [`ComponentRegistry::define`].
    pub fn define_component(
        &mut self,
        definition: ComponentDefinition,
    ) -> Result<ComponentFactory, WorldError> {
        Ok(self.components.define(definition)?)
    }

    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Build an instance of a registered component type.
    ///
    /// # Errors
    ///
    /// See [`ComponentRegistry::instantiate`].
    pub fn instantiate(&self, name: &str, props: Option<Value>) -> Result<ComponentData, WorldError> {
        Ok(self.components.instantiate(name, props)?)
    }

    /// Invoke a capability method on a component.
    ///
    /// # Errors
    ///
    /// See [`ComponentRegistry::invoke`].
    pub fn invoke(
        &self,
        receiver: &ComponentData,
        method: &str,
        args: &[&ComponentData],
    ) -> Result<Value, WorldError> {
        Ok(self.components.invoke(receiver, method, args)?)
    }

    // -- Entities --

    /// Create an entity holding the given components and index it.
    ///
    /// # Errors
    ///
    /// - [`WorldError::IdExhaustion`] if no unused id could be generated.
    /// - [`WorldError::DuplicateComponent`] if two components share a type;
    ///   no entity is created.
    pub fn create_entity<I>(&mut self, components: I) -> Result<EntityMut<'_>, WorldError>
    where
        I: IntoIterator,
        I::Item: Into<ComponentSource>,
    {
        let components: Vec<ComponentData> = components
            .into_iter()
            .map(|c| c.into().resolve())
            .collect();
        let id = self.store.allocate_id()?;
        let entity = self.store.insert(id.clone(), components)?;
        self.queries.entity_added(&self.store, entity);

        debug!(entity = %id, "entity created");
        Ok(EntityMut::new(self, entity, id))
    }

    /// Look up an active entity.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EntityNotFound`] if the entity is unknown or has
    /// been removed.
    pub fn get_entity(&self, entity: impl EntitySelector) -> Result<EntityRef<'_>, WorldError> {
        let handle = self.resolve_active(&entity)?;
        self.entity_view(handle)
            .ok_or_else(|| WorldError::EntityNotFound(entity.describe()))
    }

    /// Look up an active entity, logging a warning instead of failing.
    #[must_use]
    pub fn find_entity(&self, entity: impl EntitySelector) -> Option<EntityRef<'_>> {
        match self.get_entity(&entity) {
            Ok(view) => Some(view),
            Err(_) => {
                warn!(entity = %entity.describe(), "entity doesn't exist");
                None
            }
        }
    }

    /// Look up an active entity by handle, without logging.
    #[must_use]
    pub fn entity_view(&self, entity: Entity) -> Option<EntityRef<'_>> {
        self.store
            .record(entity)
            .map(|r| EntityRef::new(entity, r))
            .filter(EntityRef::is_active)
    }

    /// Exclusive handle to an active entity.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EntityNotFound`] if the entity is unknown or has
    /// been removed.
    pub fn entity_mut(&mut self, entity: impl EntitySelector) -> Result<EntityMut<'_>, WorldError> {
        let handle = self.resolve_active(&entity)?;
        let id = self
            .store
            .record(handle)
            .map(|r| r.id.clone())
            .ok_or_else(|| WorldError::EntityNotFound(entity.describe()))?;
        Ok(EntityMut::new(self, handle, id))
    }

    /// Assign a component (or a factory's default instance) to an entity.
    /// Returns the new component's id.
    ///
    /// # Errors
    ///
    /// - [`WorldError::EntityNotFound`] if the entity is unknown or removed.
    /// - [`WorldError::DuplicateComponent`] if it already holds the type.
    pub fn assign_component(
        &mut self,
        entity: impl EntitySelector,
        component: impl Into<ComponentSource>,
    ) -> Result<Id, WorldError> {
        let handle = self.resolve_active(&entity)?;
        let data = component.into().resolve();
        let ty = data.type_id();
        let type_name = data.type_name().to_string();
        let component_id = self.store.attach(handle, data)?;
        self.queries.component_added(&self.store, handle, ty);

        debug!(
            entity = %entity.describe(),
            component = %type_name,
            id = %component_id,
            "component assigned"
        );
        Ok(component_id)
    }

    /// Remove a component by id. Returns `false`, and logs a warning, if the
    /// entity does not hold it.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EntityNotFound`] if the entity is unknown or
    /// removed.
    pub fn remove_component(
        &mut self,
        entity: impl EntitySelector,
        component_id: &Id,
    ) -> Result<bool, WorldError> {
        let handle = self.resolve_active(&entity)?;
        match self.store.detach(handle, component_id) {
            Some(ty) => {
                self.queries.component_removed(handle, ty);
                debug!(entity = %entity.describe(), id = %component_id, "component removed");
                Ok(true)
            }
            None => {
                warn!(
                    entity = %entity.describe(),
                    id = %component_id,
                    "tried to remove a component the entity doesn't have"
                );
                Ok(false)
            }
        }
    }

    /// Remove the component of the named type. Returns `false`, and logs a
    /// warning, if the entity does not hold one.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EntityNotFound`] if the entity is unknown or
    /// removed.
    pub fn remove_component_of_type(
        &mut self,
        entity: impl EntitySelector,
        type_name: &str,
    ) -> Result<bool, WorldError> {
        let handle = self.resolve_active(&entity)?;
        let ty = ComponentTypeId::from_name(type_name);
        match self.store.detach_type(handle, ty) {
            Some(component_id) => {
                self.queries.component_removed(handle, ty);
                debug!(
                    entity = %entity.describe(),
                    component = type_name,
                    id = %component_id,
                    "component removed"
                );
                Ok(true)
            }
            None => {
                warn!(
                    entity = %entity.describe(),
                    component = type_name,
                    "tried to remove a component the entity doesn't have"
                );
                Ok(false)
            }
        }
    }

    /// Mark an entity for removal. It stops being reachable through
    /// [`World::get_entity`] at once, but its components and query membership
    /// stay until the next [`World::clean`].
    ///
    /// Returns `false` if the entity is unknown or already removed.
    pub fn remove_entity(&mut self, entity: impl EntitySelector) -> bool {
        match entity.select(&self.store) {
            Some(handle) => self.store.mark_removed(handle),
            None => {
                debug!(entity = %entity.describe(), "tried to remove an unknown entity");
                false
            }
        }
    }

    /// Purge every entity removed since the last clean. Returns how many were
    /// purged.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::PurgeDuringRun`] if called from inside a system.
    pub fn clean(&mut self) -> Result<usize, WorldError> {
        if self.running > 0 {
            return Err(WorldError::PurgeDuringRun);
        }
        let pending = self.store.take_pending();
        let mut purged = 0;
        for target in &pending {
            self.queries
                .entity_removed(target.entity, &target.component_types);
            if self.store.purge(target) {
                purged += 1;
            }
        }
        if purged > 0 {
            debug!(purged, "clean pass finished");
        }
        Ok(purged)
    }

    /// Drop every entity and component at once, including those pending
    /// purge, and empty every query. Definitions are kept.
    pub fn reset(&mut self) {
        let entities = self.store.stored_len();
        self.store.clear();
        self.queries.clear();
        info!(entities, "world reset");
    }

    /// Number of active entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.store.len()
    }

    /// Number of entities removed but not yet purged.
    #[must_use]
    pub fn pending_purge_count(&self) -> usize {
        self.store.pending().len()
    }

    /// Iterate over active entities.
    pub fn entities(&self) -> impl Iterator<Item = EntityRef<'_>> {
        self.store.iter()
    }

    #[must_use]
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    fn resolve_active(&self, entity: &impl EntitySelector) -> Result<Entity, WorldError> {
        entity
            .select(&self.store)
            .filter(|&handle| self.entity_view(handle).is_some())
            .ok_or_else(|| WorldError::EntityNotFound(entity.describe()))
    }

    // -- Queries --

    /// Register a query over the named component types.
    ///
    /// # Errors
    ///
    /// See [`QueryRegistry::register`].
    pub fn register_query<I, S>(&mut self, name: &str, components: I) -> Result<QueryHandle, WorldError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.queries.register(name, components, &self.store)
    }

    /// Look up a query by name.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&Query> {
        self.queries.find(name)
    }

    /// The live entity list of a query.
    #[must_use]
    pub fn query_entities(&self, query: QueryHandle) -> &[Entity] {
        self.queries
            .get(query)
            .map(Query::entities)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn queries(&self) -> &QueryRegistry {
        &self.queries
    }

    /// Remove a query; systems bound to it are rebound to `$GLOBAL`. Returns
    /// `false`, and logs a warning, if no query has that name.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidQuery`] for `$GLOBAL`.
    pub fn remove_query(&mut self, name: &str) -> Result<bool, WorldError> {
        match self.queries.remove(name)? {
            Some(systems) => {
                self.scheduler.rebind(&systems, self.queries.global());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Empty every query's membership, keeping the definitions.
    pub fn clear_queries(&mut self) {
        self.queries.clear();
    }

    /// Delete every query. `$GLOBAL` is re-created holding every stored
    /// entity, and all systems are rebound to it.
    pub fn reset_queries(&mut self) {
        let systems = self.queries.reset();
        let global = self.queries.global();
        self.scheduler.rebind(&systems, global);
        let stored: Vec<Entity> = self.store.iter_stored().map(|e| e.entity()).collect();
        for entity in stored {
            self.queries.add_entity_to_global(entity);
        }
    }

    // -- Systems --

    /// Register a system bound to `query`. Systems run in registration order.
    ///
    /// # Errors
    ///
    /// See [`Scheduler::register`].
    pub fn register_system<F>(
        &mut self,
        name: &str,
        query: QueryHandle,
        callback: F,
    ) -> Result<SystemHandle, WorldError>
    where
        F: FnMut(&mut SystemContext<'_>) + 'static,
    {
        self.scheduler
            .register(name, query, Box::new(callback), &mut self.queries)
    }

    /// Rebind a system to another query.
    ///
    /// # Errors
    ///
    /// See [`Scheduler::set_query`].
    pub fn set_system_query(
        &mut self,
        system: SystemHandle,
        query: QueryHandle,
    ) -> Result<(), WorldError> {
        self.scheduler.set_query(&mut self.queries, system, query)
    }

    #[must_use]
    pub fn systems(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Returns `true` while [`World::run`] is executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running > 0
    }

    /// Run every system registered before this call, in registration order.
    ///
    /// Each callback sees its query's membership as it stood when that
    /// callback started.
    pub fn run(&mut self, time: f64, delta: f64) {
        let order = self.scheduler.order();
        self.running += 1;
        for handle in order {
            let Some((query, mut callback)) = self.scheduler.take_callback(handle) else {
                warn!(system = ?handle, "system is already running, skipped");
                continue;
            };
            let entities = self.query_entities(query).to_vec();
            trace!(system = ?handle, entities = entities.len(), "running system");

            let mut ctx = SystemContext::new(self, handle, entities, time, delta);
            callback(&mut ctx);

            self.scheduler.restore_callback(handle, callback);
        }
        self.running -= 1;
    }
}

impl Drop for World {
    fn drop(&mut self) {
        WORLD_LIVE.store(false, Ordering::Release);
    }
}


#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use lattice_component::ErrorKind;
    use serde_json::json;

    use super::test_support::{lock_worlds, test_world};
    use super::*;

    fn config() -> WorldConfig {
        WorldConfig::new()
            .with_component(ComponentDefinition::new(
                "transform",
                json!({"position": {"x": 0, "y": 0}}),
            ))
            .with_component(ComponentDefinition::new("health", json!({"value": 100})))
    }

    #[test]
    fn test_second_world_rejected() {
        let world = test_world(config());
        let err = World::new(WorldConfig::new()).unwrap_err();
        assert!(matches!(err, WorldError::AlreadyConstructed));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        drop(world);
    }

    #[test]
    fn test_create_entity_from_factories() {
        let mut world = test_world(config());
        let health = world.components().factory("health").unwrap();
        let id = world.create_entity([health]).unwrap().id().clone();

        let entity = world.get_entity(&id).unwrap();
        assert_eq!(
            entity.get("health").unwrap().get("value"),
            Some(&json!(100))
        );
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn test_create_entity_duplicate_type_leaves_nothing() {
        let mut world = test_world(config());
        let a = world.instantiate("health", None).unwrap();
        let b = world.instantiate("health", None).unwrap();
        let err = world.create_entity([a, b]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert_eq!(world.entity_count(), 0);
        assert!(world.query("$GLOBAL").unwrap().is_empty());
    }

    #[test]
    fn test_get_entity_missing() {
        let world = test_world(config());
        let err = world.get_entity(42u64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(world.find_entity(42u64).is_none());
    }

    #[test]
    fn test_assign_and_remove_by_type() {
        let mut world = test_world(config());
        let living = world.register_query("living", ["health"]).unwrap();
        let entity = world.create_entity(Vec::<ComponentSource>::new()).unwrap().entity();

        let health = world.instantiate("health", None).unwrap();
        world.assign_component(entity, health).unwrap();
        assert_eq!(world.query_entities(living), &[entity]);

        let again = world.instantiate("health", None).unwrap();
        let err = world.assign_component(entity, again).unwrap_err();
        assert!(matches!(err, WorldError::DuplicateComponent { .. }));

        assert!(world.remove_component_of_type(entity, "health").unwrap());
        assert!(!world.remove_component_of_type(entity, "health").unwrap());
        assert!(world.query_entities(living).is_empty());
    }

    #[test]
    fn test_clean_refused_during_run() {
        let mut world = test_world(config());
        let global = world.queries().global();
        let seen = Rc::new(RefCell::new(None));
        let out = Rc::clone(&seen);
        world
            .register_system("cleaner", global, move |ctx| {
                *out.borrow_mut() = Some(ctx.world_mut().clean().is_err());
                assert!(ctx.world().is_running());
            })
            .unwrap();
        world.run(0.0, 0.0);
        assert_eq!(*seen.borrow(), Some(true));
        assert!(!world.is_running());
        assert_eq!(world.clean().unwrap(), 0);
    }

    #[test]
    fn test_nested_run_skips_running_system() {
        let mut world = test_world(config());
        let global = world.queries().global();
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        world
            .register_system("recursive", global, move |ctx| {
                *counter.borrow_mut() += 1;
                ctx.world_mut().run(1.0, 1.0);
            })
            .unwrap();
        world.run(0.0, 0.0);
        assert_eq!(*calls.borrow(), 1);
        let system = world.systems().by_name("recursive").unwrap();
        assert_eq!(world.systems().get(system).unwrap().runs(), 1);
    }

    #[test]
    fn test_remove_query_rebinds_systems_to_global() {
        let mut world = test_world(config());
        let living = world.register_query("living", ["health"]).unwrap();
        let system = world.register_system("heal", living, |_| {}).unwrap();

        assert!(world.remove_query("living").unwrap());
        assert!(!world.remove_query("living").unwrap());
        let global = world.queries().global();
        assert_eq!(world.systems().get(system).unwrap().query(), global);
        assert_eq!(world.query("$GLOBAL").unwrap().systems(), &[system]);
    }

    #[test]
    fn test_reset_queries_keeps_entities_and_systems() {
        let mut world = test_world(config());
        let living = world.register_query("living", ["health"]).unwrap();
        let system = world.register_system("heal", living, |_| {}).unwrap();
        let health = world.components().factory("health").unwrap();
        let entity = world.create_entity([health]).unwrap().entity();

        world.reset_queries();
        assert!(world.query("living").is_none());
        let global = world.queries().global();
        assert_eq!(world.systems().get(system).unwrap().query(), global);
        assert_eq!(world.query_entities(global), &[entity]);
    }

    #[test]
    fn test_reset_queries_leaves_old_handles_stale() {
        let mut world = test_world(config());
        let living = world.register_query("living", ["health"]).unwrap();
        world.reset_queries();
        let moving = world.register_query("moving", ["health"]).unwrap();

        assert_ne!(living, moving);
        let err = world.register_system("heal", living, |_| {}).unwrap_err();
        assert!(matches!(err, WorldError::QueryNotFound(_)));
        assert!(world.query_entities(living).is_empty());
        assert!(world.systems().is_empty());
    }

    #[test]
    fn test_reset_drops_everything() {
        let mut world = test_world(config());
        let living = world.register_query("living", ["health"]).unwrap();
        let health = world.components().factory("health").unwrap();
        let a = world.create_entity([&health]).unwrap().entity();
        world.create_entity([&health]).unwrap();
        world.remove_entity(a);

        world.reset();
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.pending_purge_count(), 0);
        assert!(world.query_entities(living).is_empty());
        assert!(world.store().indexed(health.type_id()).is_empty());
        assert_eq!(world.clean().unwrap(), 0);
    }

    #[test]
    fn test_entity_mut_edits_fields() {
        let mut world = test_world(config());
        let transform = world.components().factory("transform").unwrap();
        let mut entity = world.create_entity([transform]).unwrap();
        entity
            .get_mut("transform")
            .unwrap()
            .set("position", json!({"x": 5, "y": 6}));
        let handle = entity.entity();

        let view = world.get_entity(handle).unwrap();
        assert_eq!(
            view.get("transform").unwrap().pointer("/position/x"),
            Some(&json!(5))
        );
    }

    #[test]
    fn test_failed_config_releases_world() {
        let _guard = lock_worlds();
        let bad = WorldConfig::new().with_component(ComponentDefinition::new("bad name", json!({})));
        let err = World::new(bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let world = World::new(WorldConfig::new()).unwrap();
        drop(world);
        assert!(World::new(WorldConfig::new()).is_ok());
    }
}
