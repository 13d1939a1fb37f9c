//! Module registry.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::{ProxyError, Result};

use super::{mockule::Mockule, Module};

/// Registry of module prototypes, keyed by module name.
///
/// Populated once at process start and read-only afterwards; chain
/// construction asks it for fresh instances to configure.
pub struct ModuleRegistry {
    prototypes: RwLock<BTreeMap<String, Box<dyn Module>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            prototypes: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a prototype. Registering the same name twice is a
    /// startup error.
    pub fn register(&self, prototype: Box<dyn Module>) -> Result<()> {
        let name = prototype.name().to_string();
        let mut prototypes = self.prototypes.write();
        if prototypes.contains_key(&name) {
            return Err(ProxyError::Module(format!(
                "module {name:?} registered more than once"
            )));
        }
        prototypes.insert(name, prototype);
        Ok(())
    }

    /// Produce a fresh, unconfigured instance of the named module.
    pub fn instantiate(&self, name: &str) -> Option<Box<dyn Module>> {
        self.prototypes.read().get(name).map(|prototype| prototype.create())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.prototypes.read().contains_key(name)
    }

    /// Registered module names, in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.prototypes.read().keys().cloned().collect()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry with every built-in module registered.
pub fn default_registry() -> ModuleRegistry {
    let registry = ModuleRegistry::new();
    registry
        .register(Box::new(Mockule::default()))
        .expect("built-in module names are unique");
    registry
}
