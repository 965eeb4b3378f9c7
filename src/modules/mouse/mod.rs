//! Mouse module: left stick moves the pointer, right stick scrolls, triggers
//! throttle and boost the pointer speed, face buttons click.

pub mod motion;

use crate::mapping::{HatDirection, KeyEvent, KeyKind, KeyMap, Module, ModuleError};
use crate::output::{KeyboardKey, KeyboardSink, MouseButton, MouseSink};
use crate::persistence::ModuleConfig;
use motion::MotionIntegrator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const WORKER_JOIN_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MouseOptions {
    pub sensitivity: f64,
    pub acceleration: f64,
    pub deadzone: f64,
    pub invert_vertical: bool,
    pub scroll_sensitivity: f64,
    /// Motion updates per second
    pub movement_update_rate: f64,
}

impl Default for MouseOptions {
    fn default() -> Self {
        Self {
            sensitivity: 1.0,
            acceleration: 5.0,
            deadzone: 0.15,
            invert_vertical: false,
            scroll_sensitivity: 1.0,
            movement_update_rate: 120.0,
        }
    }
}

/// What an axis drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisRole {
    PointerX,
    PointerY,
    ScrollX,
    ScrollY,
    /// Slows the pointer down, fully pressed stops it
    Throttle,
    /// Speeds the pointer up, fully pressed doubles the acceleration term
    Boost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseAction {
    Button(MouseButton),
    Key(KeyboardKey),
    Axis(AxisRole),
}

impl FromStr for MouseAction {
    type Err = String;

    /// `mouse-left`, `mouse-right`, `mouse-middle`, an axis role such as
    /// `pointer-x`, or any keyboard key name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_ascii_lowercase().replace('_', "-");
        let role = match normalized.as_str() {
            "pointer-x" => Some(AxisRole::PointerX),
            "pointer-y" => Some(AxisRole::PointerY),
            "scroll-x" => Some(AxisRole::ScrollX),
            "scroll-y" => Some(AxisRole::ScrollY),
            "throttle" => Some(AxisRole::Throttle),
            "boost" => Some(AxisRole::Boost),
            _ => None,
        };
        if let Some(role) = role {
            return Ok(MouseAction::Axis(role));
        }
        if let Some(button) = normalized.strip_prefix("mouse-") {
            return button.parse().map(MouseAction::Button);
        }
        s.parse().map(MouseAction::Key)
    }
}

impl fmt::Display for MouseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MouseAction::Button(button) => write!(f, "mouse {:?}", button),
            MouseAction::Key(key) => write!(f, "key {}", key),
            MouseAction::Axis(role) => write!(f, "{:?}", role),
        }
    }
}

pub struct Mouse {
    keyboard: Arc<dyn KeyboardSink>,
    mouse: Arc<dyn MouseSink>,
    options: MouseOptions,
    mappings: KeyMap<MouseAction>,
    integrator: MotionIntegrator,
}

impl Mouse {
    pub const NAME: &'static str = "mouse";

    pub fn new(
        keyboard: Arc<dyn KeyboardSink>,
        mouse: Arc<dyn MouseSink>,
        config: &ModuleConfig,
    ) -> Self {
        let options: MouseOptions = config.options_or_default(Self::NAME);
        let mut mappings = Self::default_mappings();
        mappings.apply_overrides(Self::NAME, &config.mappings);
        Self::with_options(keyboard, mouse, options, mappings)
    }

    pub fn with_options(
        keyboard: Arc<dyn KeyboardSink>,
        mouse: Arc<dyn MouseSink>,
        options: MouseOptions,
        mappings: KeyMap<MouseAction>,
    ) -> Self {
        let integrator = MotionIntegrator::new(mouse.clone(), options.clone());
        Self {
            keyboard,
            mouse,
            options,
            mappings,
            integrator,
        }
    }

    pub fn default_mappings() -> KeyMap<MouseAction> {
        KeyMap::new()
            .with_release_mapping()
            .button(0, MouseAction::Button(MouseButton::Left))
            .button(1, MouseAction::Button(MouseButton::Right))
            .button(2, MouseAction::Button(MouseButton::Middle))
            .button(3, MouseAction::Key(KeyboardKey::Enter))
            .hat(HatDirection::Up, MouseAction::Key(KeyboardKey::Up))
            .hat(HatDirection::Down, MouseAction::Key(KeyboardKey::Down))
            .hat(HatDirection::Left, MouseAction::Key(KeyboardKey::Left))
            .hat(HatDirection::Right, MouseAction::Key(KeyboardKey::Right))
            .axis(0, MouseAction::Axis(AxisRole::PointerX))
            .axis(1, MouseAction::Axis(AxisRole::PointerY))
            .axis(2, MouseAction::Axis(AxisRole::Throttle))
            .axis(3, MouseAction::Axis(AxisRole::ScrollX))
            .axis(4, MouseAction::Axis(AxisRole::ScrollY))
            .axis(5, MouseAction::Axis(AxisRole::Boost))
    }

    pub fn integrator(&self) -> &MotionIntegrator {
        &self.integrator
    }

    fn handle_axis(&self, role: AxisRole, value: f64) {
        let value = if value.abs() < self.options.deadzone {
            0.0
        } else {
            value
        };
        let mut state = self.integrator.state().lock();
        match role {
            AxisRole::PointerX => state.velocity.0 = value,
            AxisRole::PointerY => {
                state.velocity.1 = if self.options.invert_vertical {
                    -value
                } else {
                    value
                }
            }
            AxisRole::ScrollX => state.scroll.0 = value * self.options.scroll_sensitivity,
            // Stick down is positive, the wheel scrolls up on positive values
            AxisRole::ScrollY => state.scroll.1 = -value * self.options.scroll_sensitivity,
            AxisRole::Throttle => state.multiplier = 1.0 - value,
            AxisRole::Boost => state.multiplier = 1.0 + value,
        }
    }

    /// Presses on the rising edge of the deadzone threshold, releases on the falling edge
    fn handle_button(&self, event: &KeyEvent, button: MouseButton) {
        let Some(key) = event.input_key() else {
            return;
        };
        let pressed = f64::from(event.value) >= self.options.deadzone;
        let edge = {
            let mut state = self.integrator.state().lock();
            let held = state.held.contains_key(&key);
            if pressed && !held {
                state.held.insert(key, button);
                Some(true)
            } else if !pressed && held {
                state.held.remove(&key);
                Some(false)
            } else {
                None
            }
        };

        let result = match edge {
            Some(true) => {
                debug!("mouse: pressing {:?}", button);
                self.mouse.press(button)
            }
            Some(false) => {
                debug!("mouse: releasing {:?}", button);
                self.mouse.release(button)
            }
            None => return,
        };
        if let Err(e) = result {
            warn!("mouse: failed to emit {:?}: {}", button, e);
        }
    }

    fn handle_key(&self, event: &KeyEvent, key: KeyboardKey) {
        if !event.is_pressed() {
            return;
        }
        if event.kind == KeyKind::Axis && f64::from(event.value.abs()) < self.options.deadzone {
            return;
        }
        if let Err(e) = self.keyboard.press(key) {
            warn!("mouse: failed to press {}: {}", key, e);
        }
    }
}

impl Module for Mouse {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn load(&mut self) -> Result<(), ModuleError> {
        self.integrator.reset();
        self.integrator.start()
    }

    fn unload(&mut self) -> Result<(), ModuleError> {
        self.integrator.reset();
        self.integrator.stop(WORKER_JOIN_TIMEOUT);
        Ok(())
    }

    fn on_key(&mut self, event: &KeyEvent) {
        let Some(action) = self.mappings.resolve(event).copied() else {
            return;
        };
        match action {
            MouseAction::Axis(role) => self.handle_axis(role, f64::from(event.value)),
            MouseAction::Button(button) => self.handle_button(event, button),
            MouseAction::Key(key) => self.handle_key(event, key),
        }
    }
}
