//! Inert placeholder module

use crate::mapping::{KeyEvent, Module, ModuleError};

/// Active when nothing else should react to the controller
#[derive(Debug, Default)]
pub struct Dummy;

impl Dummy {
    pub const NAME: &'static str = "dummy";

    pub fn new() -> Self {
        Self
    }
}

impl Module for Dummy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn load(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }

    fn unload(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }

    fn on_key(&mut self, _event: &KeyEvent) {}
}
