//! Ordered set of modules with exactly one current entry

use crate::mapping::module::{Module, ModuleHost};
use crate::mapping::RegistryError;
use tracing::info;

/// Modules in registration order. Index 0 is always the placeholder, so
/// `current` addresses a valid entry from construction on.
pub struct ModuleRegistry {
    modules: Vec<ModuleHost>,
    current: usize,
}

impl ModuleRegistry {
    pub fn new(placeholder: Box<dyn Module>) -> Self {
        info!("module: added placeholder '{}'", placeholder.name());
        Self {
            modules: vec![ModuleHost::new(placeholder, true)],
            current: 0,
        }
    }

    /// Appends a module; names must be unique.
    pub fn register(&mut self, module: Box<dyn Module>) -> Result<usize, RegistryError> {
        let name = module.name();
        if self.index_of(name).is_some() {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        info!("module: added '{}'", name);
        self.modules.push(ModuleHost::new(module, false));
        Ok(self.modules.len() - 1)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.modules.iter().position(|m| m.name() == name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &ModuleHost {
        &self.modules[self.current]
    }

    pub fn current_mut(&mut self) -> &mut ModuleHost {
        &mut self.modules[self.current]
    }

    pub fn get(&self, index: usize) -> Option<&ModuleHost> {
        self.modules.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ModuleHost> {
        self.modules.get_mut(index)
    }

    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Cyclic successor of the current module, optionally stepping over the placeholder
    pub fn next_index(&self, skip_placeholder: bool) -> usize {
        let mut next = (self.current + 1) % self.modules.len();
        if skip_placeholder && self.modules[next].is_placeholder() {
            next = (next + 1) % self.modules.len();
        }
        next
    }

    pub(crate) fn set_current(&mut self, index: usize) -> Result<(), RegistryError> {
        if index >= self.modules.len() {
            return Err(RegistryError::UnknownIndex(index));
        }
        self.current = index;
        Ok(())
    }
}
