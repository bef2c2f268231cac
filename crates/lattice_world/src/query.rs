//! Query registry: named component-type filters and their live entity lists.
//!
//! Every query stores the handles of the entities that hold all of its
//! required component types. Membership is maintained incrementally: the
//! world reports each component assignment and removal, and the registry
//! updates only the queries indexed under that component type.
//!
//! `$GLOBAL` always exists, has no requirements, and lists every entity that
//! has not been purged.

use std::collections::HashMap;

use lattice_component::{ComponentError, ComponentTypeId, is_valid_type_name};
use slotmap::SlotMap;
use tracing::{debug, info, warn};

use crate::entity::{Entity, EntityRef};
use crate::error::WorldError;
use crate::scheduler::SystemHandle;
use crate::store::EntityStore;

slotmap::new_key_type! {
    /// Handle of a registered query.
    pub struct QueryHandle;
}

/// Name of the query that matches every entity.
pub const GLOBAL_QUERY: &str = "$GLOBAL";

/// A registered query.
#[derive(Debug)]
pub struct Query {
    name: String,
    /// Deduplicated, in the order they were listed.
    required: Vec<ComponentTypeId>,
    required_names: Vec<String>,
    entities: Vec<Entity>,
    systems: Vec<SystemHandle>,
}

impl Query {
    fn new(name: String, required: Vec<ComponentTypeId>, required_names: Vec<String>) -> Self {
        Self {
            name,
            required,
            required_names,
            entities: Vec::new(),
            systems: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn required(&self) -> &[ComponentTypeId] {
        &self.required
    }

    #[must_use]
    pub fn required_names(&self) -> &[String] {
        &self.required_names
    }

    /// The live entity list, in the order entities joined.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Systems bound to this query.
    #[must_use]
    pub fn systems(&self) -> &[SystemHandle] {
        &self.systems
    }

    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains(&entity)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns `true` if the entity holds every required component type.
    #[must_use]
    pub fn test(&self, entity: &EntityRef<'_>) -> bool {
        self.required
            .iter()
            .all(|&ty| entity.get_by_type(ty).is_some())
    }

    fn insert(&mut self, entity: Entity) -> bool {
        if self.entities.contains(&entity) {
            return false;
        }
        self.entities.push(entity);
        true
    }

    fn remove(&mut self, entity: Entity) -> bool {
        match self.entities.iter().position(|&e| e == entity) {
            Some(pos) => {
                self.entities.remove(pos);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug)]
pub struct QueryRegistry {
    queries: SlotMap<QueryHandle, Query>,
    by_name: HashMap<String, QueryHandle>,
    /// Component type → queries that require it.
    by_component: HashMap<ComponentTypeId, Vec<QueryHandle>>,
    /// Queries with no requirements: `$GLOBAL` and any user query registered
    /// with an empty type list.
    unfiltered: Vec<QueryHandle>,
    global: QueryHandle,
}

impl Default for QueryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryRegistry {
    #[must_use]
    pub fn new() -> Self {
        let mut queries = SlotMap::with_key();
        let global = queries.insert(Query::new(GLOBAL_QUERY.to_string(), Vec::new(), Vec::new()));
        Self {
            queries,
            by_name: HashMap::from([(GLOBAL_QUERY.to_string(), global)]),
            by_component: HashMap::new(),
            unfiltered: vec![global],
            global,
        }
    }

    /// Register a query and backfill it from the entities already stored.
    ///
    /// Backfill walks the component-index list of the required type with the
    /// fewest entries and keeps the candidates that hold every other required
    /// type. A query with no requirements starts with every stored entity.
    /// Entities pending purge are included, matching a query registered
    /// before their removal; `clean` drops them from every query.
    ///
    /// # Errors
    ///
    /// - [`WorldError::InvalidQuery`] if the name is empty.
    /// - [`WorldError::DuplicateQuery`] if the name is taken, including by
    ///   `$GLOBAL`.
    /// - [`ComponentError::InvalidName`] if a type name is not an identifier.
    pub fn register<I, S>(
        &mut self,
        name: &str,
        components: I,
        store: &EntityStore,
    ) -> Result<QueryHandle, WorldError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if name.is_empty() {
            return Err(WorldError::InvalidQuery {
                name: String::new(),
                message: "query name must not be empty".into(),
            });
        }
        if self.by_name.contains_key(name) {
            return Err(WorldError::DuplicateQuery(name.to_string()));
        }

        let mut required = Vec::new();
        let mut required_names = Vec::new();
        for component in components {
            let component = component.as_ref();
            if !is_valid_type_name(component) {
                return Err(ComponentError::InvalidName(component.to_string()).into());
            }
            let ty = ComponentTypeId::from_name(component);
            if !required.contains(&ty) {
                required.push(ty);
                required_names.push(component.to_string());
            }
        }

        let mut query = Query::new(name.to_string(), required, required_names);
        backfill(&mut query, store);

        info!(
            query = name,
            components = ?query.required_names,
            entities = query.entities.len(),
            "query registered"
        );

        let unfiltered = query.required.is_empty();
        let required = query.required.clone();
        let handle = self.queries.insert(query);
        self.by_name.insert(name.to_string(), handle);
        for ty in required {
            self.by_component.entry(ty).or_default().push(handle);
        }
        if unfiltered {
            self.unfiltered.push(handle);
        }
        Ok(handle)
    }

    /// Re-test the queries indexed under `ty` after the entity gained a
    /// component of that type.
    pub fn component_added(&mut self, store: &EntityStore, entity: Entity, ty: ComponentTypeId) {
        let Some(view) = store.record(entity).map(|r| EntityRef::new(entity, r)) else {
            return;
        };
        for handle in self.by_component.get(&ty).into_iter().flatten() {
            let Some(query) = self.queries.get_mut(*handle) else {
                continue;
            };
            if query.test(&view) && query.insert(entity) {
                debug!(query = %query.name, entity = %view.id(), "entity joined query");
            }
        }
    }

    /// Drop the entity from every query indexed under `ty`.
    pub fn component_removed(&mut self, entity: Entity, ty: ComponentTypeId) {
        for handle in self.by_component.get(&ty).into_iter().flatten() {
            let Some(query) = self.queries.get_mut(*handle) else {
                continue;
            };
            if query.remove(entity) {
                debug!(query = %query.name, ?entity, "entity left query");
            }
        }
    }

    /// Index a newly created entity: every query matching its components, and
    /// every unfiltered query.
    pub fn entity_added(&mut self, store: &EntityStore, entity: Entity) {
        let types: Vec<ComponentTypeId> = match store.record(entity) {
            Some(record) => record.component_types(),
            None => return,
        };
        for ty in types {
            self.component_added(store, entity, ty);
        }
        self.add_entity_to_global(entity);
    }

    /// Drop a purged entity from every query it could belong to.
    pub fn entity_removed(&mut self, entity: Entity, types: &[ComponentTypeId]) {
        for &ty in types {
            self.component_removed(entity, ty);
        }
        self.remove_entity_from_global(entity);
    }

    pub fn add_entity_to_global(&mut self, entity: Entity) {
        for handle in &self.unfiltered {
            if let Some(query) = self.queries.get_mut(*handle) {
                query.insert(entity);
            }
        }
    }

    pub fn remove_entity_from_global(&mut self, entity: Entity) {
        for handle in &self.unfiltered {
            if let Some(query) = self.queries.get_mut(*handle) {
                query.remove(entity);
            }
        }
    }

    /// Remove a query, moving its systems onto `$GLOBAL`.
    ///
    /// Returns the rebound systems, or `None` if no query has that name.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidQuery`] for `$GLOBAL`.
    pub fn remove(&mut self, name: &str) -> Result<Option<Vec<SystemHandle>>, WorldError> {
        if name == GLOBAL_QUERY {
            return Err(WorldError::InvalidQuery {
                name: name.to_string(),
                message: "the global query cannot be removed".into(),
            });
        }
        let Some(handle) = self.by_name.remove(name) else {
            warn!(query = name, "tried to remove a query that doesn't exist");
            return Ok(None);
        };
        let Some(query) = self.queries.remove(handle) else {
            return Ok(None);
        };

        for ty in &query.required {
            if let Some(handles) = self.by_component.get_mut(ty) {
                handles.retain(|&h| h != handle);
            }
        }
        self.unfiltered.retain(|&h| h != handle);

        if let Some(global) = self.queries.get_mut(self.global) {
            global.systems.extend_from_slice(&query.systems);
        }
        info!(query = name, systems = query.systems.len(), "query removed");
        Ok(Some(query.systems))
    }

    /// Empty every membership list, keeping the definitions.
    pub fn clear(&mut self) {
        for query in self.queries.values_mut() {
            query.entities.clear();
        }
    }

    /// Delete every query, re-create `$GLOBAL`, and bind every system that
    /// was attached to any query onto it. Returns those systems.
    pub fn reset(&mut self) -> Vec<SystemHandle> {
        let systems: Vec<SystemHandle> = self
            .queries
            .values_mut()
            .flat_map(|q| std::mem::take(&mut q.systems))
            .collect();
        // Removing through the slotmap bumps generations, so handles taken
        // before the reset stay stale.
        self.queries.clear();
        self.by_name.clear();
        self.by_component.clear();
        let mut global = Query::new(GLOBAL_QUERY.to_string(), Vec::new(), Vec::new());
        global.systems.clone_from(&systems);
        self.global = self.queries.insert(global);
        self.by_name.insert(GLOBAL_QUERY.to_string(), self.global);
        self.unfiltered = vec![self.global];
        info!(systems = systems.len(), "query registry reset");
        systems
    }

    pub(crate) fn attach_system(&mut self, handle: QueryHandle, system: SystemHandle) -> bool {
        match self.queries.get_mut(handle) {
            Some(query) => {
                query.systems.push(system);
                true
            }
            None => false,
        }
    }

    pub(crate) fn detach_system(&mut self, handle: QueryHandle, system: SystemHandle) {
        if let Some(query) = self.queries.get_mut(handle) {
            query.systems.retain(|&s| s != system);
        }
    }

    #[must_use]
    pub fn get(&self, handle: QueryHandle) -> Option<&Query> {
        self.queries.get(handle)
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<QueryHandle> {
        self.by_name.get(name).copied()
    }

    /// Look up a query by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Query> {
        self.by_name(name).and_then(|h| self.queries.get(h))
    }

    /// Handle of `$GLOBAL`.
    #[must_use]
    pub fn global(&self) -> QueryHandle {
        self.global
    }

    pub fn iter(&self) -> impl Iterator<Item = (QueryHandle, &Query)> {
        self.queries.iter()
    }

    /// Queries that require the named component type.
    pub fn queries_for(&self, type_name: &str) -> impl Iterator<Item = &Query> {
        self.by_component
            .get(&ComponentTypeId::from_name(type_name))
            .into_iter()
            .flatten()
            .filter_map(|h| self.queries.get(*h))
    }

    /// Number of queries, `$GLOBAL` included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

fn backfill(query: &mut Query, store: &EntityStore) {
    if query.required.is_empty() {
        for view in store.iter_stored() {
            query.insert(view.entity());
        }
        return;
    }

    let Some(seed) = query
        .required
        .iter()
        .map(|&ty| store.indexed(ty))
        .min_by_key(|entries| entries.len())
    else {
        return;
    };
    for entry in seed {
        let Some(record) = store.record(entry.entity) else {
            continue;
        };
        let view = EntityRef::new(entry.entity, record);
        if query.test(&view) {
            query.insert(entry.entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use lattice_component::{ComponentData, Id, IdGenerator};
    use serde_json::Map;

    use super::*;

    fn data(name: &str) -> ComponentData {
        ComponentData::new(name, Map::new()).unwrap()
    }

    fn spawn(store: &mut EntityStore, names: &[&str]) -> Entity {
        let id = store.allocate_id().unwrap();
        store
            .insert(id, names.iter().map(|n| data(n)).collect())
            .unwrap()
    }

    fn make_store() -> EntityStore {
        EntityStore::new(IdGenerator::auto(), IdGenerator::auto())
    }

    #[test]
    fn test_global_exists_and_is_reserved() {
        let mut registry = QueryRegistry::new();
        let store = make_store();
        assert_eq!(registry.by_name(GLOBAL_QUERY), Some(registry.global()));

        let err = registry
            .register(GLOBAL_QUERY, ["transform"], &store)
            .unwrap_err();
        assert!(matches!(err, WorldError::DuplicateQuery(_)));

        let err = registry.remove(GLOBAL_QUERY).unwrap_err();
        assert!(matches!(err, WorldError::InvalidQuery { .. }));
    }

    #[test]
    fn test_register_deduplicates_components() {
        let mut registry = QueryRegistry::new();
        let store = make_store();
        let handle = registry
            .register("moving", ["transform", "velocity", "transform"], &store)
            .unwrap();
        let query = registry.get(handle).unwrap();
        assert_eq!(query.required_names(), &["transform", "velocity"]);
        assert_eq!(registry.queries_for("transform").count(), 1);
    }

    #[test]
    fn test_register_rejects_invalid_type_name() {
        let mut registry = QueryRegistry::new();
        let store = make_store();
        let err = registry.register("bad", ["not valid"], &store).unwrap_err();
        assert!(matches!(
            err,
            WorldError::Component(ComponentError::InvalidName(_))
        ));
        assert!(registry.find("bad").is_none());
    }

    #[test]
    fn test_backfill_matches_existing_entities() {
        let mut store = make_store();
        let a = spawn(&mut store, &["transform", "health"]);
        let _b = spawn(&mut store, &["transform"]);
        let c = spawn(&mut store, &["health", "transform"]);

        let mut registry = QueryRegistry::new();
        let handle = registry
            .register("living", ["transform", "health"], &store)
            .unwrap();
        assert_eq!(registry.get(handle).unwrap().entities(), &[a, c]);
    }

    #[test]
    fn test_backfill_keeps_pending_purge() {
        let mut store = make_store();
        let a = spawn(&mut store, &["health"]);
        let b = spawn(&mut store, &["health"]);

        let mut registry = QueryRegistry::new();
        let early = registry.register("early", ["health"], &store).unwrap();
        store.mark_removed(a);
        let late = registry.register("late", ["health"], &store).unwrap();
        let everything = registry
            .register("everything", Vec::<String>::new(), &store)
            .unwrap();

        assert_eq!(registry.get(late).unwrap().entities(), &[a, b]);
        assert_eq!(
            registry.get(early).unwrap().entities(),
            registry.get(late).unwrap().entities()
        );
        assert!(registry.get(everything).unwrap().contains(a));

        for target in store.take_pending() {
            registry.entity_removed(target.entity, &target.component_types);
        }
        assert_eq!(registry.get(late).unwrap().entities(), &[b]);
        assert_eq!(registry.get(everything).unwrap().entities(), &[b]);
    }

    #[test]
    fn test_reset_invalidates_old_handles() {
        let store = make_store();
        let mut registry = QueryRegistry::new();
        let old_global = registry.global();
        let living = registry.register("living", ["health"], &store).unwrap();

        registry.reset();
        let moving = registry.register("moving", ["velocity"], &store).unwrap();

        assert_ne!(living, moving);
        assert!(registry.get(living).is_none());
        assert!(registry.get(old_global).is_none());
        assert_ne!(registry.global(), old_global);
        assert_eq!(registry.find(GLOBAL_QUERY).unwrap().name(), GLOBAL_QUERY);
        assert_eq!(registry.queries_for("health").count(), 0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unfiltered_query_matches_everything() {
        let mut store = make_store();
        let a = spawn(&mut store, &[]);
        let mut registry = QueryRegistry::new();
        let handle = registry
            .register("everything", Vec::<String>::new(), &store)
            .unwrap();
        assert_eq!(registry.get(handle).unwrap().entities(), &[a]);

        let b = spawn(&mut store, &["health"]);
        registry.entity_added(&store, b);
        assert_eq!(registry.get(handle).unwrap().entities(), &[a, b]);
    }

    #[test]
    fn test_incremental_membership() {
        let mut store = make_store();
        let mut registry = QueryRegistry::new();
        let handle = registry
            .register("living", ["transform", "health"], &store)
            .unwrap();

        let e = spawn(&mut store, &["transform"]);
        registry.entity_added(&store, e);
        assert!(registry.get(handle).unwrap().is_empty());

        store.attach(e, data("health")).unwrap();
        let health = ComponentTypeId::from_name("health");
        registry.component_added(&store, e, health);
        registry.component_added(&store, e, health);
        assert_eq!(registry.get(handle).unwrap().entities(), &[e]);

        registry.component_removed(e, health);
        registry.component_removed(e, health);
        assert!(registry.get(handle).unwrap().is_empty());
        assert!(registry.get(registry.global()).unwrap().contains(e));
    }

    #[test]
    fn test_remove_unknown_query_is_noop() {
        let mut registry = QueryRegistry::new();
        assert!(registry.remove("nothing").unwrap().is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_unindexes_query() {
        let mut store = make_store();
        let mut registry = QueryRegistry::new();
        registry.register("living", ["health"], &store).unwrap();
        assert!(registry.remove("living").unwrap().is_some());
        assert_eq!(registry.queries_for("health").count(), 0);

        let e = spawn(&mut store, &["health"]);
        registry.entity_added(&store, e);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_clear_keeps_definitions() {
        let mut store = make_store();
        let mut registry = QueryRegistry::new();
        let handle = registry.register("living", ["health"], &store).unwrap();
        let e = spawn(&mut store, &["health"]);
        registry.entity_added(&store, e);

        registry.clear();
        assert!(registry.get(handle).unwrap().is_empty());
        assert!(registry.get(registry.global()).unwrap().is_empty());
        assert_eq!(registry.find("living").unwrap().required_names(), &["health"]);
        assert_eq!(store.lookup(&Id::Num(1)), Some(e));
    }
}
