//! Input router: single entry point for controller events
//!
//! # Flow
//!
//! ```text
//! KeyEvent ──► pressed set ──► chord held? ──yes──► switch_module(None)
//!                                  │
//!                                  no
//!                                  ▼
//!                     anti-ghosting filter ──► current module on_key
//! ```
//!
//! The router runs on the collector thread and owns all of its state, so no
//! locking happens here. Module lifecycle calls go through [`ModuleHost`].
//!
//! [`ModuleHost`]: crate::mapping::module::ModuleHost

use crate::controller::haptics::{Haptics, RumblePattern};
use crate::mapping::key_event::{KeyEvent, KeyKind};
use crate::mapping::registry::ModuleRegistry;
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

/// Buttons that switch to the next module when held together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChordSpec {
    buttons: BTreeSet<u8>,
}

impl ChordSpec {
    pub fn new(buttons: impl IntoIterator<Item = u8>) -> Self {
        Self {
            buttons: buttons.into_iter().collect(),
        }
    }

    /// An empty chord never matches
    pub fn is_held(&self, pressed: &BTreeSet<u8>) -> bool {
        !self.buttons.is_empty() && self.buttons.is_subset(pressed)
    }
}

/// Router behavior switches, taken from the main configuration
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub switch_shortcut: ChordSpec,
    pub ignore_multiple_buttons: bool,
    pub skip_placeholder_on_cycle: bool,
    pub haptic_feedback: bool,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            switch_shortcut: ChordSpec::new([4, 5, 8, 9]),
            ignore_multiple_buttons: true,
            skip_placeholder_on_cycle: false,
            haptic_feedback: true,
        }
    }
}

pub struct InputRouter {
    registry: ModuleRegistry,
    pressed_buttons: BTreeSet<u8>,
    settings: RouterSettings,
    haptics: Box<dyn Haptics>,
}

impl InputRouter {
    pub fn new(
        registry: ModuleRegistry,
        settings: RouterSettings,
        haptics: Box<dyn Haptics>,
    ) -> Self {
        Self {
            registry,
            pressed_buttons: BTreeSet::new(),
            settings,
            haptics,
        }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn current_module(&self) -> &str {
        self.registry.current().name()
    }

    pub fn pressed_buttons(&self) -> &BTreeSet<u8> {
        &self.pressed_buttons
    }

    /// Switches to the module with the given name. Returns `false` if no such module exists.
    pub fn activate(&mut self, name: &str) -> bool {
        match self.registry.index_of(name) {
            Some(index) => {
                info!("module: setting initial '{}'", name);
                self.switch_module(Some(index));
                true
            }
            None => {
                warn!("module: no module named '{}' to activate", name);
                false
            }
        }
    }

    pub fn on_key(&mut self, event: KeyEvent) {
        if event.kind == KeyKind::Button {
            if event.is_pressed() {
                self.pressed_buttons.insert(event.index);
            } else {
                self.pressed_buttons.remove(&event.index);
            }
        }

        if self.settings.switch_shortcut.is_held(&self.pressed_buttons) {
            info!("module: switching after triggering shortcut");
            self.pressed_buttons.clear();
            self.switch_module(None);
            return;
        }

        if event.kind == KeyKind::Button
            && self.pressed_buttons.len() > 1
            && self.settings.ignore_multiple_buttons
        {
            debug!(
                "callback: ignoring button {} because {:?} are pressed",
                event.index, self.pressed_buttons
            );
            return;
        }

        self.registry.current_mut().on_key(&event);
    }

    /// Unloads the current module and loads `target`, or the cyclic successor when `None`.
    ///
    /// Failures of either hook are logged only: the new module becomes current
    /// even if its `load` failed.
    pub fn switch_module(&mut self, target: Option<usize>) {
        if !self.registry.current_mut().unload() {
            warn!(
                "module: '{}' did not unload cleanly",
                self.registry.current().name()
            );
        }

        let cyclic = target.is_none();
        let next = match target {
            Some(index) if index < self.registry.len() => index,
            Some(index) => {
                error!("module: unknown index {}, cycling instead", index);
                self.registry.next_index(self.settings.skip_placeholder_on_cycle)
            }
            None => self.registry.next_index(self.settings.skip_placeholder_on_cycle),
        };

        if let Some(module) = self.registry.get_mut(next) {
            if !module.load() {
                error!("failed to load module '{}'", module.name());
            }
        }

        if let Err(e) = self.registry.set_current(next) {
            error!("module: {}", e);
            return;
        }
        info!("module: '{}' is now active", self.current_module());

        if cyclic {
            self.vibrate(RumblePattern::module_switch(next));
        }
    }

    pub fn controller_connected(&mut self, name: &str) {
        info!("controller: registered {}", name);
        self.vibrate(RumblePattern::registered());
    }

    pub fn controller_disconnected(&mut self, name: &str) {
        info!("controller: unregistered {}", name);
        self.pressed_buttons.clear();
    }

    /// Unloads the current module before the process exits
    pub fn shutdown(&mut self) {
        info!("router: shutting down '{}'", self.current_module());
        self.registry.current_mut().unload();
    }

    fn vibrate(&mut self, pattern: RumblePattern) {
        if self.settings.haptic_feedback {
            self.haptics.rumble(pattern);
        }
    }
}
