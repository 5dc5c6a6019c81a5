//! Registry of event definitions, prototypes and controller templates

use std::collections::HashMap;
use std::sync::Arc;

use crate::controller::Controller;
use crate::definition::{EventDefinition, EventPrototype};

/// Name-keyed registry filled from configuration
///
/// Registering a name again replaces the previous entry. Lookups return
/// `None` on a miss; an unknown name is a normal condition for callers.
#[derive(Debug, Default)]
pub struct EventManager {
    definitions: HashMap<String, EventDefinition>,
    prototypes: HashMap<String, Arc<EventPrototype>>,
    controllers: HashMap<String, Arc<Controller>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_definition(&mut self, name: impl Into<String>, definition: EventDefinition) {
        let name = name.into();
        if self.definitions.insert(name.clone(), definition).is_some() {
            tracing::debug!("Replaced event definition {}", name);
        }
    }

    pub fn register_prototype(&mut self, name: impl Into<String>, prototype: EventPrototype) {
        let name = name.into();
        if self.prototypes.insert(name.clone(), Arc::new(prototype)).is_some() {
            tracing::debug!("Replaced event prototype {}", name);
        }
    }

    pub fn register_controller(&mut self, name: impl Into<String>, controller: Controller) {
        let name = name.into();
        if self.controllers.insert(name.clone(), Arc::new(controller)).is_some() {
            tracing::debug!("Replaced controller {}", name);
        }
    }

    pub fn definition(&self, name: &str) -> Option<&EventDefinition> {
        self.definitions.get(name)
    }

    pub fn prototype(&self, name: &str) -> Option<Arc<EventPrototype>> {
        self.prototypes.get(name).cloned()
    }

    pub fn controller(&self, name: &str) -> Option<Arc<Controller>> {
        self.controllers.get(name).cloned()
    }

    pub fn definition_count(&self) -> usize {
        self.definitions.len()
    }

    pub fn prototype_count(&self) -> usize {
        self.prototypes.len()
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }
}
