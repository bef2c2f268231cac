//! Component schema registry: collects component definitions (name,
//! default fields, capability methods) into the registry the world uses to
//! build component instances.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::component::{ComponentData, ComponentTypeId, is_valid_type_name};
use crate::error::{ComponentError, value_kind};

/// A capability method attached to a component type.
///
/// Capabilities are free functions keyed by the component type and a method
/// name. They receive the component they are invoked on plus any number of
/// argument components, and return a JSON value. The runtime never calls them
/// itself; they are an extension point for application code.
#[derive(Clone)]
pub struct Capability(Arc<dyn Fn(&ComponentData, &[&ComponentData]) -> Value>);

impl Capability {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ComponentData, &[&ComponentData]) -> Value + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, receiver: &ComponentData, args: &[&ComponentData]) -> Value {
        (self.0)(receiver, args)
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Capability(..)")
    }
}

/// Input to [`ComponentRegistry::define`].
///
/// Definitions deserialize from JSON (`{"name": ..., "defaults": {...}}`) so
/// they can be loaded from files; capabilities can only be attached in code.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentDefinition {
    pub name: String,
    pub defaults: Value,
    #[serde(skip)]
    pub methods: BTreeMap<String, Capability>,
}

impl ComponentDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>, defaults: Value) -> Self {
        Self {
            name: name.into(),
            defaults,
            methods: BTreeMap::new(),
        }
    }

    /// Attach a capability method.
    #[must_use]
    pub fn with_method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ComponentData, &[&ComponentData]) -> Value + 'static,
    {
        self.methods.insert(name.into(), Capability::new(f));
        self
    }
}

/// A registered component schema.
#[derive(Debug, Clone)]
pub struct ComponentSchema {
    name: Arc<str>,
    type_id: ComponentTypeId,
    defaults: Arc<Map<String, Value>>,
    capabilities: BTreeMap<String, Capability>,
}

impl ComponentSchema {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn type_id(&self) -> ComponentTypeId {
        self.type_id
    }

    #[must_use]
    pub fn defaults(&self) -> &Map<String, Value> {
        &self.defaults
    }

    /// Names of the capability methods attached to this type.
    pub fn capability_names(&self) -> impl Iterator<Item = &str> {
        self.capabilities.keys().map(String::as_str)
    }

    #[must_use]
    pub fn capability(&self, method: &str) -> Option<&Capability> {
        self.capabilities.get(method)
    }

    fn factory(&self) -> ComponentFactory {
        ComponentFactory {
            name: Arc::clone(&self.name),
            type_id: self.type_id,
            defaults: Arc::clone(&self.defaults),
        }
    }
}

/// Builds instances of one component type.
///
/// Factories share the schema's defaults, so cloning one is cheap and
/// instantiating does not need the registry.
#[derive(Debug, Clone)]
pub struct ComponentFactory {
    name: Arc<str>,
    type_id: ComponentTypeId,
    defaults: Arc<Map<String, Value>>,
}

impl ComponentFactory {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn type_id(&self) -> ComponentTypeId {
        self.type_id
    }

    /// Build an instance populated with the default fields.
    #[must_use]
    pub fn create(&self) -> ComponentData {
        ComponentData::from_parts(Arc::clone(&self.name), (*self.defaults).clone())
    }

    /// Build an instance from `props`, filling in missing fields from the
    /// defaults. Keys absent from the defaults are copied through.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::InvalidProps`] if `props` is not a JSON
    /// object.
    pub fn with_props(&self, props: Value) -> Result<ComponentData, ComponentError> {
        let Value::Object(mut fields) = props else {
            return Err(ComponentError::InvalidProps {
                component: self.name.to_string(),
                found: value_kind(&props),
            });
        };
        for (key, value) in self.defaults.iter() {
            if !fields.contains_key(key) {
                fields.insert(key.clone(), value.clone());
            }
        }
        Ok(ComponentData::from_parts(Arc::clone(&self.name), fields))
    }

    /// Build an instance, with or without props.
    ///
    /// # Errors
    ///
    /// See [`ComponentFactory::with_props`].
    pub fn instantiate(&self, props: Option<Value>) -> Result<ComponentData, ComponentError> {
        match props {
            Some(props) => self.with_props(props),
            None => Ok(self.create()),
        }
    }
}

impl AsRef<str> for ComponentFactory {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

/// Registry of every component schema known to a world.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    schemas: HashMap<ComponentTypeId, ComponentSchema>,
    /// Type ids in registration order.
    order: Vec<ComponentTypeId>,
}

impl ComponentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component schema and return its factory.
    ///
    /// # Errors
    ///
    /// - [`ComponentError::InvalidName`] if the name is not an identifier.
    /// - [`ComponentError::DuplicateComponent`] if the name is taken.
    /// - [`ComponentError::InvalidDefaults`] if the defaults are not an object.
    /// - [`ComponentError::InvalidCapability`] if a method name is not an
    ///   identifier.
    pub fn define(
        &mut self,
        definition: ComponentDefinition,
    ) -> Result<ComponentFactory, ComponentError> {
        let ComponentDefinition {
            name,
            defaults,
            methods,
        } = definition;

        if !is_valid_type_name(&name) {
            return Err(ComponentError::InvalidName(name));
        }
        let type_id = ComponentTypeId::from_name(&name);
        if self.schemas.contains_key(&type_id) {
            return Err(ComponentError::DuplicateComponent(name));
        }
        let Value::Object(defaults) = defaults else {
            return Err(ComponentError::InvalidDefaults {
                component: name,
                found: value_kind(&defaults),
            });
        };
        if let Some(method) = methods.keys().find(|m| !is_valid_type_name(m)) {
            return Err(ComponentError::InvalidCapability {
                component: name,
                method: method.clone(),
            });
        }

        let schema = ComponentSchema {
            name: Arc::from(name.as_str()),
            type_id,
            defaults: Arc::new(defaults),
            capabilities: methods,
        };
        let factory = schema.factory();

        info!(
            component = %name,
            fields = schema.defaults.len(),
            capabilities = schema.capabilities.len(),
            "component defined"
        );

        self.schemas.insert(type_id, schema);
        self.order.push(type_id);
        Ok(factory)
    }

    /// Register several schemas in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first error [`ComponentRegistry::define`] reports; schemas
    /// defined before it stay registered.
    pub fn define_all<I>(&mut self, definitions: I) -> Result<Vec<ComponentFactory>, ComponentError>
    where
        I: IntoIterator<Item = ComponentDefinition>,
    {
        definitions
            .into_iter()
            .map(|definition| self.define(definition))
            .collect()
    }

    /// Returns the factory for a registered type.
    #[must_use]
    pub fn factory(&self, name: &str) -> Option<ComponentFactory> {
        self.schema(name).map(ComponentSchema::factory)
    }

    /// Build an instance of a registered type.
    ///
    /// # Errors
    ///
    /// - [`ComponentError::UndefinedComponent`] if no schema is registered.
    /// - [`ComponentError::InvalidProps`] if `props` is not an object.
    pub fn instantiate(
        &self,
        name: &str,
        props: Option<Value>,
    ) -> Result<ComponentData, ComponentError> {
        let schema = self
            .schema(name)
            .ok_or_else(|| ComponentError::UndefinedComponent(name.to_string()))?;
        schema.factory().instantiate(props)
    }

    /// Invoke a capability method on a component.
    ///
    /// The method is looked up on the schema of `receiver`'s type.
    ///
    /// # Errors
    ///
    /// - [`ComponentError::UnknownComponent`] if the receiver's type has no
    ///   schema.
    /// - [`ComponentError::UnknownCapability`] if the method is not attached.
    pub fn invoke(
        &self,
        receiver: &ComponentData,
        method: &str,
        args: &[&ComponentData],
    ) -> Result<Value, ComponentError> {
        let schema = self
            .schemas
            .get(&receiver.type_id())
            .ok_or_else(|| ComponentError::UnknownComponent(receiver.type_name().to_string()))?;
        let capability =
            schema
                .capability(method)
                .ok_or_else(|| ComponentError::UnknownCapability {
                    component: schema.name().to_string(),
                    method: method.to_string(),
                })?;
        debug!(component = schema.name(), method, args = args.len(), "invoking capability");
        Ok(capability.call(receiver, args))
    }

    #[must_use]
    pub fn schema(&self, name: &str) -> Option<&ComponentSchema> {
        self.schemas.get(&ComponentTypeId::from_name(name))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.schema(name).is_some()
    }

    /// Registered type names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order
            .iter()
            .filter_map(|id| self.schemas.get(id))
            .map(ComponentSchema::name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;

    fn make_registry() -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        registry
            .define(ComponentDefinition::new(
                "transform",
                json!({"position": {"x": 0, "y": 0}, "scale": 1, "rotation": 0}),
            ))
            .unwrap();
        registry
            .define(ComponentDefinition::new("health", json!({"value": 100})))
            .unwrap();
        registry
    }

    #[test]
    fn test_define_and_instantiate_defaults() {
        let registry = make_registry();
        let health = registry.instantiate("health", None).unwrap();
        assert_eq!(health.type_name(), "health");
        assert_eq!(health.get("value"), Some(&json!(100)));
    }

    #[test]
    fn test_props_override_defaults() {
        let registry = make_registry();
        let t = registry
            .instantiate("transform", Some(json!({"position": {"x": 32, "y": 22}})))
            .unwrap();
        assert_eq!(t.pointer("/position/x"), Some(&json!(32)));
        assert_eq!(t.get("scale"), Some(&json!(1)));
        assert_eq!(t.get("rotation"), Some(&json!(0)));
    }

    #[test]
    fn test_unknown_props_are_copied_through() {
        let registry = make_registry();
        let h = registry
            .instantiate("health", Some(json!({"regen": 2})))
            .unwrap();
        assert_eq!(h.get("regen"), Some(&json!(2)));
        assert_eq!(h.get("value"), Some(&json!(100)));
    }

    #[test]
    fn test_null_props_count_as_defined() {
        let registry = make_registry();
        let h = registry
            .instantiate("health", Some(json!({"value": null})))
            .unwrap();
        assert_eq!(h.get("value"), Some(&Value::Null));
    }

    #[test]
    fn test_non_object_props_rejected() {
        let registry = make_registry();
        let err = registry.instantiate("health", Some(json!([1, 2]))).unwrap_err();
        assert!(matches!(err, ComponentError::InvalidProps { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_unknown_component_rejected() {
        let registry = make_registry();
        let err = registry.instantiate("velocity", None).unwrap_err();
        assert!(matches!(err, ComponentError::UndefinedComponent(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_duplicate_definition_rejected() {
        let mut registry = make_registry();
        let err = registry
            .define(ComponentDefinition::new("health", json!({})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateName);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_invalid_name_rejected() {
        let mut registry = ComponentRegistry::new();
        let err = registry
            .define(ComponentDefinition::new("9lives", json!({})))
            .unwrap_err();
        assert!(matches!(err, ComponentError::InvalidName(_)));
    }

    #[test]
    fn test_non_object_defaults_rejected() {
        let mut registry = ComponentRegistry::new();
        let err = registry
            .define(ComponentDefinition::new("score", json!(0)))
            .unwrap_err();
        assert!(matches!(err, ComponentError::InvalidDefaults { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_factory_instances_are_independent() {
        let registry = make_registry();
        let factory = registry.factory("health").unwrap();
        let mut a = factory.create();
        let b = factory.create();
        a.set("value", json!(1));
        assert_eq!(b.get("value"), Some(&json!(100)));
    }

    #[test]
    fn test_define_all_preserves_order() {
        let mut registry = ComponentRegistry::new();
        registry
            .define_all([
                ComponentDefinition::new("b", json!({})),
                ComponentDefinition::new("a", json!({})),
            ])
            .unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn test_definitions_deserialize_from_json() {
        let definitions: Vec<ComponentDefinition> = serde_json::from_value(json!([
            {"name": "score", "defaults": {"points": 0}}
        ]))
        .unwrap();
        let mut registry = ComponentRegistry::new();
        registry.define_all(definitions).unwrap();
        assert!(registry.contains("score"));
    }

    #[test]
    fn test_capability_dispatch() {
        let mut registry = ComponentRegistry::new();
        registry
            .define(
                ComponentDefinition::new("counter", json!({"n": 1})).with_method(
                    "sum",
                    |this, args| {
                        let own = this.get("n").and_then(Value::as_i64).unwrap_or(0);
                        let rest: i64 = args
                            .iter()
                            .filter_map(|c| c.get("n").and_then(Value::as_i64))
                            .sum();
                        json!(own + rest)
                    },
                ),
            )
            .unwrap();

        let a = registry.instantiate("counter", Some(json!({"n": 2}))).unwrap();
        let b = registry.instantiate("counter", Some(json!({"n": 5}))).unwrap();
        assert_eq!(registry.invoke(&a, "sum", &[&b]).unwrap(), json!(7));

        let err = registry.invoke(&a, "product", &[]).unwrap_err();
        assert!(matches!(err, ComponentError::UnknownCapability { .. }));
        assert_eq!(
            registry.schema("counter").unwrap().capability_names().collect::<Vec<_>>(),
            vec!["sum"]
        );
    }

    #[test]
    fn test_invalid_capability_name_rejected() {
        let mut registry = ComponentRegistry::new();
        let err = registry
            .define(ComponentDefinition::new("a", json!({})).with_method("not ok", |_, _| Value::Null))
            .unwrap_err();
        assert!(matches!(err, ComponentError::InvalidCapability { .. }));
    }
}
