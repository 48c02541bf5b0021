//! Explicit registry of modules.
//!
//! Nothing registers itself: the composition root creates a [`ModuleRegistry`], registers
//! the prototypes of the modules it supports, and instantiates them according to its configuration.

use std::collections::hash_map::Entry;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::module::{ModuleError, ModuleId, OutputModule};

/// Modules known to the application, indexed by their [`ModuleId`].
///
/// There is at most one module per id.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: FxHashMap<ModuleId, Box<dyn OutputModule>>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("module {0} is already registered")]
    AlreadyRegistered(ModuleId),
    #[error("no prototype registered for module {0}")]
    UnknownModule(String),
    #[error("could not instantiate module {id}")]
    Duplicate {
        id: ModuleId,
        #[source]
        source: ModuleError,
    },
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module under its id.
    ///
    /// # Errors
    /// Fails if a module with the same id is already registered. In that case,
    /// the registry is left untouched and `module` is dropped.
    pub fn register(&mut self, module: Box<dyn OutputModule>) -> Result<&mut dyn OutputModule, RegistryError> {
        let id = module.id().clone();
        match self.modules.entry(id) {
            Entry::Occupied(e) => Err(RegistryError::AlreadyRegistered(e.key().clone())),
            Entry::Vacant(e) => {
                log::debug!("registered module {} ({})", e.key(), module.metadata().name);
                Ok(e.insert(module).as_mut())
            }
        }
    }

    /// Creates a new instance of the module `generic` by duplicating its prototype, and registers it.
    pub fn instantiate(&mut self, generic: &str, specific: &str) -> Result<&mut dyn OutputModule, RegistryError> {
        let id = ModuleId::new(generic, specific);
        if self.modules.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        let prototype = self
            .modules
            .get(&ModuleId::prototype(generic))
            .ok_or_else(|| RegistryError::UnknownModule(generic.to_owned()))?;
        let module = prototype
            .duplicate(specific)
            .map_err(|source| RegistryError::Duplicate { id, source })?;
        self.register(module)
    }

    pub fn get(&self, id: &ModuleId) -> Option<&dyn OutputModule> {
        self.modules.get(id).map(|m| m.as_ref())
    }

    pub fn get_mut(&mut self, id: &ModuleId) -> Option<&mut dyn OutputModule> {
        match self.modules.get_mut(id) {
            Some(m) => Some(m.as_mut()),
            None => None,
        }
    }

    pub fn remove(&mut self, id: &ModuleId) -> Option<Box<dyn OutputModule>> {
        self.modules.remove(id)
    }

    /// Returns the ids of the registered modules, sorted.
    pub fn ids(&self) -> Vec<&ModuleId> {
        let mut ids: Vec<&ModuleId> = self.modules.keys().collect();
        ids.sort();
        ids
    }

    /// Iterates over the modules that are not prototypes.
    pub fn instances(&self) -> impl Iterator<Item = &dyn OutputModule> {
        self.modules
            .iter()
            .filter(|(id, _)| !id.is_prototype())
            .map(|(_, m)| m.as_ref())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
