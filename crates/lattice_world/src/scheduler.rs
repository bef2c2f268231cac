//! System scheduler: named callbacks bound to queries, run in registration
//! order.

use std::collections::HashMap;

use slotmap::SlotMap;
use tracing::info;

use crate::context::SystemContext;
use crate::error::WorldError;
use crate::query::{QueryHandle, QueryRegistry};

slotmap::new_key_type! {
    /// Handle of a registered system.
    pub struct SystemHandle;
}

/// A system callback. It receives the snapshot of its query's entities, the
/// run's `time` and `delta`, and mutable access to the world.
pub type SystemFn = Box<dyn FnMut(&mut SystemContext<'_>)>;

/// A registered system.
pub struct System {
    name: String,
    query: QueryHandle,
    /// Taken out while the callback executes.
    callback: Option<SystemFn>,
    runs: u64,
}

impl System {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The query this system iterates.
    #[must_use]
    pub fn query(&self) -> QueryHandle {
        self.query
    }

    /// How many times the callback has completed.
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Returns `true` while the callback is executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.callback.is_none()
    }
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("name", &self.name)
            .field("query", &self.query)
            .field("runs", &self.runs)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct Scheduler {
    systems: SlotMap<SystemHandle, System>,
    /// Execution order.
    order: Vec<SystemHandle>,
    by_name: HashMap<String, SystemHandle>,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system and bind it to `query`. It runs after every system
    /// registered before it.
    ///
    /// # Errors
    ///
    /// - [`WorldError::DuplicateSystem`] if the name is taken.
    /// - [`WorldError::QueryNotFound`] if the query handle is stale.
    pub fn register(
        &mut self,
        name: &str,
        query: QueryHandle,
        callback: SystemFn,
        queries: &mut QueryRegistry,
    ) -> Result<SystemHandle, WorldError> {
        if self.by_name.contains_key(name) {
            return Err(WorldError::DuplicateSystem(name.to_string()));
        }
        let Some(query_name) = queries.get(query).map(|q| q.name().to_string()) else {
            return Err(WorldError::QueryNotFound(format!("{query:?}")));
        };

        let handle = self.systems.insert(System {
            name: name.to_string(),
            query,
            callback: Some(callback),
            runs: 0,
        });
        queries.attach_system(query, handle);
        self.order.push(handle);
        self.by_name.insert(name.to_string(), handle);

        info!(system = name, query = %query_name, position = self.order.len(), "system registered");
        Ok(handle)
    }

    /// Move a system onto another query.
    ///
    /// # Errors
    ///
    /// - [`WorldError::SystemNotFound`] if the system handle is stale.
    /// - [`WorldError::QueryNotFound`] if the query handle is stale.
    pub fn set_query(
        &mut self,
        queries: &mut QueryRegistry,
        system: SystemHandle,
        query: QueryHandle,
    ) -> Result<(), WorldError> {
        let Some(entry) = self.systems.get_mut(system) else {
            return Err(WorldError::SystemNotFound(format!("{system:?}")));
        };
        let Some(query_name) = queries.get(query).map(|q| q.name().to_string()) else {
            return Err(WorldError::QueryNotFound(format!("{query:?}")));
        };
        queries.detach_system(entry.query, system);
        queries.attach_system(query, system);
        entry.query = query;
        info!(system = %entry.name, query = %query_name, "system rebound");
        Ok(())
    }

    /// Point systems at `query` without touching the registry's side of the
    /// binding; used after the registry has already moved them.
    pub(crate) fn rebind(&mut self, systems: &[SystemHandle], query: QueryHandle) {
        for &handle in systems {
            if let Some(system) = self.systems.get_mut(handle) {
                system.query = query;
            }
        }
    }

    /// The execution order, copied so systems registered during a run do not
    /// join it.
    #[must_use]
    pub fn order(&self) -> Vec<SystemHandle> {
        self.order.clone()
    }

    pub(crate) fn take_callback(&mut self, handle: SystemHandle) -> Option<(QueryHandle, SystemFn)> {
        let system = self.systems.get_mut(handle)?;
        let callback = system.callback.take()?;
        Some((system.query, callback))
    }

    pub(crate) fn restore_callback(&mut self, handle: SystemHandle, callback: SystemFn) {
        if let Some(system) = self.systems.get_mut(handle) {
            system.callback = Some(callback);
            system.runs += 1;
        }
    }

    #[must_use]
    pub fn get(&self, handle: SystemHandle) -> Option<&System> {
        self.systems.get(handle)
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<SystemHandle> {
        self.by_name.get(name).copied()
    }

    /// Look up a system by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&System> {
        self.by_name(name).and_then(|h| self.systems.get(h))
    }

    /// Systems in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (SystemHandle, &System)> {
        self.order
            .iter()
            .filter_map(|&h| self.systems.get(h).map(|s| (h, s)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use lattice_component::IdGenerator;

    use super::*;
    use crate::store::EntityStore;

    fn noop() -> SystemFn {
        Box::new(|_ctx| {})
    }

    #[test]
    fn test_register_preserves_order() {
        let mut queries = QueryRegistry::new();
        let global = queries.global();
        let mut scheduler = Scheduler::new();
        let a = scheduler.register("a", global, noop(), &mut queries).unwrap();
        let b = scheduler.register("b", global, noop(), &mut queries).unwrap();
        let c = scheduler.register("c", global, noop(), &mut queries).unwrap();

        assert_eq!(scheduler.order(), vec![a, b, c]);
        let names: Vec<&str> = scheduler.iter().map(|(_, s)| s.name()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(queries.get(global).unwrap().systems(), &[a, b, c]);
    }

    #[test]
    fn test_duplicate_system_rejected() {
        let mut queries = QueryRegistry::new();
        let global = queries.global();
        let mut scheduler = Scheduler::new();
        scheduler.register("a", global, noop(), &mut queries).unwrap();
        let err = scheduler
            .register("a", global, noop(), &mut queries)
            .unwrap_err();
        assert!(matches!(err, WorldError::DuplicateSystem(_)));
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_stale_query_rejected() {
        let store = EntityStore::new(IdGenerator::auto(), IdGenerator::auto());
        let mut queries = QueryRegistry::new();
        queries.register("living", ["health"], &store).unwrap();
        let stale = queries.by_name("living").unwrap();
        queries.remove("living").unwrap();

        let mut scheduler = Scheduler::new();
        let err = scheduler
            .register("a", stale, noop(), &mut queries)
            .unwrap_err();
        assert!(matches!(err, WorldError::QueryNotFound(_)));
    }

    #[test]
    fn test_set_query_moves_binding() {
        let store = EntityStore::new(IdGenerator::auto(), IdGenerator::auto());
        let mut queries = QueryRegistry::new();
        let global = queries.global();
        let living = queries.register("living", ["health"], &store).unwrap();

        let mut scheduler = Scheduler::new();
        let a = scheduler.register("a", global, noop(), &mut queries).unwrap();
        scheduler.set_query(&mut queries, a, living).unwrap();

        assert_eq!(scheduler.get(a).unwrap().query(), living);
        assert!(queries.get(global).unwrap().systems().is_empty());
        assert_eq!(queries.get(living).unwrap().systems(), &[a]);
    }

    #[test]
    fn test_take_and_restore_callback() {
        let mut queries = QueryRegistry::new();
        let global = queries.global();
        let mut scheduler = Scheduler::new();
        let a = scheduler.register("a", global, noop(), &mut queries).unwrap();

        let (query, callback) = scheduler.take_callback(a).unwrap();
        assert_eq!(query, global);
        assert!(scheduler.get(a).unwrap().is_running());
        assert!(scheduler.take_callback(a).is_none());

        scheduler.restore_callback(a, callback);
        assert!(!scheduler.get(a).unwrap().is_running());
        assert_eq!(scheduler.get(a).unwrap().runs(), 1);
    }
}
