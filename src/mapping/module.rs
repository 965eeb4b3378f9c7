//! Module contract, lifecycle wrapper and key-mapping resolution
//!
//! Every behavior profile implements [`Module`]. The router never calls the hooks
//! directly; it goes through [`ModuleHost`], which logs the lifecycle, tracks
//! whether the module is loaded and turns errors and panics into a plain success
//! flag so a misbehaving module can never stop event dispatch.

use crate::mapping::key_event::{HatDirection, InputKey, KeyEvent, KeyKind};
use crate::mapping::ModuleError;
use crate::persistence::config::MappingsConfig;
use std::collections::HashMap;
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use tracing::{debug, error, info, warn};

/// Capability set of a behavior profile
pub trait Module: Send {
    /// Unique, lowercase module name (also the config table name)
    fn name(&self) -> &str;

    /// Acquires background resources. Called once per activation.
    fn load(&mut self) -> Result<(), ModuleError>;

    /// Releases everything `load` acquired. Must be safe to call when `load`
    /// never ran or failed, and safe to call twice.
    fn unload(&mut self) -> Result<(), ModuleError>;

    /// Handles one controller event while the module is active
    fn on_key(&mut self, event: &KeyEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unloaded,
    Loaded,
}

/// Registry entry: a module plus its descriptor and lifecycle state
pub struct ModuleHost {
    module: Box<dyn Module>,
    name: String,
    is_placeholder: bool,
    state: LifecycleState,
}

impl ModuleHost {
    pub fn new(module: Box<dyn Module>, is_placeholder: bool) -> Self {
        let name = module.name().to_string();
        Self {
            module,
            name,
            is_placeholder,
            state: LifecycleState::Unloaded,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_placeholder(&self) -> bool {
        self.is_placeholder
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Runs the module's load hook. Returns `false` on error or panic.
    pub fn load(&mut self) -> bool {
        info!(module = %self.name, "loading");
        match self.guarded(|module| module.load()) {
            Ok(()) => {
                self.state = LifecycleState::Loaded;
                debug!(module = %self.name, "loaded");
                true
            }
            Err(e) => {
                self.state = LifecycleState::Unloaded;
                error!(module = %self.name, "load failed: {}", e);
                false
            }
        }
    }

    /// Runs the module's unload hook. Returns `false` on error or panic.
    pub fn unload(&mut self) -> bool {
        info!(module = %self.name, "unloading");
        let result = self.guarded(|module| module.unload());
        self.state = LifecycleState::Unloaded;
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(module = %self.name, "unload failed: {}", e);
                false
            }
        }
    }

    pub fn on_key(&mut self, event: &KeyEvent) {
        let result = self.guarded(|module| {
            module.on_key(event);
            Ok(())
        });
        if let Err(e) = result {
            error!(module = %self.name, "failed to handle {:?}: {}", event, e);
        }
    }

    fn guarded<F>(&mut self, hook: F) -> Result<(), ModuleError>
    where
        F: FnOnce(&mut dyn Module) -> Result<(), ModuleError>,
    {
        let module = self.module.as_mut();
        match catch_unwind(AssertUnwindSafe(|| hook(module))) {
            Ok(result) => result,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(ModuleError::Panicked(message))
            }
        }
    }
}

/// Mapping table from controller inputs to module specific actions
#[derive(Debug, Clone)]
pub struct KeyMap<A> {
    entries: HashMap<InputKey, A>,
    map_button_release: bool,
}

impl<A> Default for KeyMap<A> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            map_button_release: false,
        }
    }
}

impl<A> KeyMap<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also resolve button events with `value == 0`, needed for press/release emulation
    pub fn with_release_mapping(mut self) -> Self {
        self.map_button_release = true;
        self
    }

    pub fn button(mut self, index: u8, action: A) -> Self {
        self.entries.insert(InputKey::Button(index), action);
        self
    }

    pub fn hat(mut self, direction: HatDirection, action: A) -> Self {
        self.entries.insert(InputKey::Hat(direction), action);
        self
    }

    pub fn axis(mut self, index: u8, action: A) -> Self {
        self.entries.insert(InputKey::Axis(index), action);
        self
    }

    pub fn get(&self, key: &InputKey) -> Option<&A> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves the action bound to an event.
    ///
    /// Button releases resolve to nothing unless release mapping is enabled.
    pub fn resolve(&self, event: &KeyEvent) -> Option<&A> {
        if event.kind == KeyKind::Button && !event.is_pressed() && !self.map_button_release {
            return None;
        }
        self.entries.get(&event.input_key()?)
    }
}

impl<A> KeyMap<A>
where
    A: FromStr,
    A::Err: Display,
{
    /// Applies the `mappings` section of a module config over the defaults.
    /// The action `none` removes a default binding.
    pub fn apply_overrides(&mut self, module: &str, overrides: &MappingsConfig) {
        let button = overrides.button.iter().map(|(k, v)| {
            let key = k.parse::<u8>().map(InputKey::Button).map_err(|e| e.to_string());
            (k, key, v)
        });
        let hat = overrides
            .hat
            .iter()
            .map(|(k, v)| (k, k.parse::<HatDirection>().map(InputKey::Hat), v));
        let axis = overrides.axis.iter().map(|(k, v)| {
            let key = k.parse::<u8>().map(InputKey::Axis).map_err(|e| e.to_string());
            (k, key, v)
        });

        for (raw_key, key, raw_action) in button.chain(hat).chain(axis) {
            let key = match key {
                Ok(key) => key,
                Err(e) => {
                    warn!(module, "skipping mapping '{}': {}", raw_key, e);
                    continue;
                }
            };
            if raw_action.eq_ignore_ascii_case("none") {
                self.entries.remove(&key);
                continue;
            }
            match raw_action.parse::<A>() {
                Ok(action) => {
                    debug!(module, "mapping {} -> {}", key, raw_action);
                    self.entries.insert(key, action);
                }
                Err(e) => warn!(module, "skipping mapping for {}: {}", key, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    fn table() -> KeyMap<String> {
        KeyMap::new()
            .button(0, "ENTER".to_string())
            .hat(HatDirection::Up, "UP".to_string())
            .axis(2, "THROTTLE".to_string())
    }

    #[test]
    fn button_release_resolves_to_nothing_by_default() {
        let map = table();
        assert_eq!(map.resolve(&KeyEvent::button(0, true)), Some(&"ENTER".to_string()));
        assert_eq!(map.resolve(&KeyEvent::button(0, false)), None);
    }

    #[test]
    fn release_mapping_resolves_button_release() {
        let map = table().with_release_mapping();
        assert_eq!(map.resolve(&KeyEvent::button(0, false)), Some(&"ENTER".to_string()));
    }

    #[test]
    fn hats_resolve_by_direction_and_axes_by_index() {
        let map = table();
        assert_eq!(
            map.resolve(&KeyEvent::hat(0, HatDirection::Up)),
            Some(&"UP".to_string())
        );
        assert_eq!(map.resolve(&KeyEvent::hat(0, HatDirection::Centered)), None);
        assert_eq!(
            map.resolve(&KeyEvent::axis(2, 0.0)),
            Some(&"THROTTLE".to_string())
        );
    }

    #[test]
    fn overrides_replace_remove_and_skip_invalid_entries() {
        let mut map = table();
        let overrides = MappingsConfig {
            button: BTreeMap::from([
                ("0".to_string(), "none".to_string()),
                ("7".to_string(), "MENU".to_string()),
                ("seven".to_string(), "MENU".to_string()),
            ]),
            hat: BTreeMap::from([("left".to_string(), "LEFT".to_string())]),
            axis: BTreeMap::new(),
        };
        map.apply_overrides("test", &overrides);

        assert_eq!(map.get(&InputKey::Button(0)), None);
        assert_eq!(map.get(&InputKey::Button(7)), Some(&"MENU".to_string()));
        assert_eq!(
            map.get(&InputKey::Hat(HatDirection::Left)),
            Some(&"LEFT".to_string())
        );
        assert_eq!(map.len(), 4);
    }

    struct Flaky {
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Module for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn load(&mut self) -> Result<(), ModuleError> {
            self.calls.lock().unwrap().push("load");
            Err(ModuleError::InitializationError("no device".into()))
        }

        fn unload(&mut self) -> Result<(), ModuleError> {
            self.calls.lock().unwrap().push("unload");
            Ok(())
        }

        fn on_key(&mut self, _event: &KeyEvent) {
            panic!("boom");
        }
    }

    #[test]
    fn host_turns_errors_and_panics_into_flags() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut host = ModuleHost::new(
            Box::new(Flaky {
                calls: calls.clone(),
            }),
            false,
        );

        assert!(!host.load());
        assert_eq!(host.state(), LifecycleState::Unloaded);
        host.on_key(&KeyEvent::button(0, true));
        assert!(host.unload());
        assert!(host.unload());
        assert_eq!(*calls.lock().unwrap(), vec!["load", "unload", "unload"]);
    }
}
