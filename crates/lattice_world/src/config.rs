//! World configuration.

use lattice_component::{ComponentDefinition, IdGenerator};

/// Configuration for a [`World`](crate::World).
///
/// Both id generators default to auto-increment integers starting at 1.
#[derive(Debug, Default)]
pub struct WorldConfig {
    /// Generator for entity ids.
    pub entity_ids: IdGenerator,
    /// Generator for component ids.
    pub component_ids: IdGenerator,
    /// Component schemas defined when the world is created.
    pub components: Vec<ComponentDefinition>,
}

impl WorldConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the entity id generator.
    #[must_use]
    pub fn with_entity_ids(mut self, ids: IdGenerator) -> Self {
        self.entity_ids = ids;
        self
    }

    /// Override the component id generator.
    #[must_use]
    pub fn with_component_ids(mut self, ids: IdGenerator) -> Self {
        self.component_ids = ids;
        self
    }

    /// Define a component schema when the world is created.
    #[must_use]
    pub fn with_component(mut self, definition: ComponentDefinition) -> Self {
        self.components.push(definition);
        self
    }

    #[must_use]
    pub fn with_components(
        mut self,
        definitions: impl IntoIterator<Item = ComponentDefinition>,
    ) -> Self {
        self.components.extend(definitions);
        self
    }
}
