//! Gamepad event collection
//!
//! Polls gilrs on the controller thread, converts every event into a
//! [`KeyEvent`] with fixed Xbox style numbering and hands it straight to the
//! [`InputRouter`]. Rumble patterns queued by the router are played between
//! two events, since only this thread owns the `Gilrs` context.

use super::haptics::{self, RumblePattern};
use crate::mapping::{HatDirection, InputRouter, KeyEvent};
use chrono::{DateTime, Local};
use gilrs::ff::Effect;
use gilrs::{Axis, Button, Event, EventType, GamepadId, Gilrs};
use statum::{machine, state};
use std::sync::mpsc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Hat index reported for the d-pad
pub const DPAD_HAT: u8 = 0;

#[derive(Clone, Debug)]
pub struct CollectorSettings {
    /// Longest wait for a gilrs event before checking for shutdown and rumble
    pub poll_timeout: Duration,
    /// Interval of the event rate debug line
    pub stats_interval: chrono::Duration,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(50),
            stats_interval: chrono::Duration::seconds(10),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),
}

/// Button numbering shared with the mapping tables
pub fn button_index(button: Button) -> Option<u8> {
    match button {
        Button::South => Some(0),
        Button::East => Some(1),
        Button::West => Some(2),
        Button::North => Some(3),
        Button::LeftTrigger => Some(4),
        Button::RightTrigger => Some(5),
        Button::Select => Some(6),
        Button::Start => Some(7),
        Button::LeftThumb => Some(8),
        Button::RightThumb => Some(9),
        Button::Mode => Some(10),
        _ => None,
    }
}

/// Axis numbering shared with the mapping tables, and whether the value is flipped
fn stick_axis(axis: Axis) -> Option<(u8, bool)> {
    match axis {
        Axis::LeftStickX => Some((0, false)),
        Axis::LeftStickY => Some((1, true)),
        Axis::RightStickX => Some((3, false)),
        Axis::RightStickY => Some((4, true)),
        _ => None,
    }
}

/// Analog triggers arrive as button value changes in `0.0..=1.0`
fn trigger_axis(button: Button) -> Option<u8> {
    match button {
        Button::LeftTrigger2 => Some(2),
        Button::RightTrigger2 => Some(5),
        _ => None,
    }
}

/// Combines the four d-pad buttons into one hat
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DpadState {
    up: bool,
    right: bool,
    down: bool,
    left: bool,
}

impl DpadState {
    pub fn direction(&self) -> HatDirection {
        HatDirection::from_dpad(self.up, self.right, self.down, self.left)
    }

    /// Updates one d-pad button. Returns the new direction if it changed.
    pub fn set_button(&mut self, button: Button, pressed: bool) -> Option<HatDirection> {
        let before = self.direction();
        match button {
            Button::DPadUp => self.up = pressed,
            Button::DPadRight => self.right = pressed,
            Button::DPadDown => self.down = pressed,
            Button::DPadLeft => self.left = pressed,
            _ => return None,
        }
        let after = self.direction();
        (after != before).then_some(after)
    }

    /// Updates from d-pads reported as axes. `y` is positive upwards.
    pub fn set_axis(&mut self, axis: Axis, value: f32) -> Option<HatDirection> {
        let before = self.direction();
        match axis {
            Axis::DPadX => {
                self.left = value < -0.5;
                self.right = value > 0.5;
            }
            Axis::DPadY => {
                self.up = value > 0.5;
                self.down = value < -0.5;
            }
            _ => return None,
        }
        let after = self.direction();
        (after != before).then_some(after)
    }
}

/// Converts one gilrs event. Connection events are handled by the collector itself.
pub fn convert_event(event: &EventType, dpad: &mut DpadState) -> Option<KeyEvent> {
    match *event {
        EventType::ButtonPressed(button, _) => button_index(button)
            .map(|index| KeyEvent::button(index, true))
            .or_else(|| dpad.set_button(button, true).map(|d| KeyEvent::hat(DPAD_HAT, d))),
        EventType::ButtonReleased(button, _) => button_index(button)
            .map(|index| KeyEvent::button(index, false))
            .or_else(|| dpad.set_button(button, false).map(|d| KeyEvent::hat(DPAD_HAT, d))),
        EventType::ButtonChanged(button, value, _) => {
            trigger_axis(button).map(|index| KeyEvent::axis(index, value.clamp(0.0, 1.0)))
        }
        EventType::AxisChanged(axis, value, _) => match stick_axis(axis) {
            Some((index, flip)) => Some(KeyEvent::axis(index, if flip { -value } else { value })),
            None => dpad.set_axis(axis, value).map(|d| KeyEvent::hat(DPAD_HAT, d)),
        },
        _ => None,
    }
}

pub(crate) fn open_gilrs() -> Result<Gilrs, CollectorError> {
    info!("Initializing gilrs controller interface");
    match Gilrs::new() {
        Ok(gilrs) => {
            info!("Successfully initialized gilrs");
            Ok(gilrs)
        }
        Err(e) => {
            error!("Failed to initialize gilrs: {}", e);
            Err(CollectorError::InitializationError(e.to_string()))
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
pub struct EventCollector<S: CollectionState> {
    gilrs: Gilrs,
    active_gamepad: Option<GamepadId>,
    settings: CollectorSettings,
    router: InputRouter,
    rumble_queue: mpsc::Receiver<RumblePattern>,
    // Kept alive while it plays
    rumble: Option<Effect>,
    dpad: DpadState,
}

impl EventCollector<Initializing> {
    pub fn create(
        gilrs: Gilrs,
        router: InputRouter,
        rumble_queue: mpsc::Receiver<RumblePattern>,
        settings: CollectorSettings,
    ) -> Self {
        debug!("Creating EventCollector with settings: {:?}", settings);
        Self::new(
            gilrs,
            None,
            settings,
            router,
            rumble_queue,
            None,
            DpadState::default(),
        )
    }

    /// Selects the first connected gamepad and starts collecting
    pub fn initialize(mut self) -> EventCollector<Collecting> {
        let gamepads: Vec<(GamepadId, String)> = self
            .gilrs
            .gamepads()
            .map(|(id, gamepad)| (id, gamepad.name().to_string()))
            .collect();

        if gamepads.is_empty() {
            warn!("No gamepad connected, waiting for one");
        } else {
            info!("Found {} gamepads:", gamepads.len());
            for (idx, (id, name)) in gamepads.iter().enumerate() {
                info!("  [{}] ID: {}, Name: {}", idx, id, name);
            }
            let (id, name) = &gamepads[0];
            self.active_gamepad = Some(*id);
            self.router.controller_connected(name);
        }

        info!("Event Collector initialized, transitioning to Collecting state");
        self.transition()
    }
}

impl EventCollector<Collecting> {
    /// Runs until `cancel` fires, then unloads the active module
    pub fn run_collection_loop(&mut self, cancel: &CancellationToken) {
        info!("Starting Event Collector loop");
        let mut event_count: u64 = 0;
        let mut last_log_time: DateTime<Local> = Local::now();

        while !cancel.is_cancelled() {
            if let Some(event) = self.gilrs.next_event_blocking(Some(self.settings.poll_timeout)) {
                self.handle_event(event);
                event_count += 1;
            }
            self.play_pending_rumble();

            let now = Local::now();
            if now - last_log_time > self.settings.stats_interval {
                debug!(
                    "Event Collector stats: {} events since {}",
                    event_count,
                    last_log_time.format("%H:%M:%S")
                );
                event_count = 0;
                last_log_time = now;
            }
        }

        info!("Event Collector stopping");
        self.router.shutdown();
    }

    fn handle_event(&mut self, Event { id, event, .. }: Event) {
        match event {
            EventType::Connected => {
                if self.active_gamepad.is_none() {
                    self.active_gamepad = Some(id);
                    let name = self.gilrs.gamepad(id).name().to_string();
                    self.router.controller_connected(&name);
                } else {
                    debug!("Ignoring additional gamepad {}", id);
                }
                return;
            }
            EventType::Disconnected => {
                if self.active_gamepad == Some(id) {
                    self.active_gamepad = None;
                    self.dpad = DpadState::default();
                    let name = self.gilrs.gamepad(id).name().to_string();
                    self.router.controller_disconnected(&name);
                }
                return;
            }
            _ => {}
        }

        match self.active_gamepad {
            Some(active) if active != id => {
                debug!("Skipping event from non-active gamepad: {:?}", id);
                return;
            }
            None => {
                // A gamepad that was present before gilrs reported it
                self.active_gamepad = Some(id);
            }
            _ => {}
        }

        if let Some(key_event) = convert_event(&event, &mut self.dpad) {
            debug!(
                "{:?} {} = {} at {}",
                key_event.kind,
                key_event.index,
                key_event.value,
                Local::now().format("%H:%M:%S.%3f")
            );
            self.router.on_key(key_event);
        }
    }

    fn play_pending_rumble(&mut self) {
        if let Some(effect) =
            haptics::play_pending(&mut self.gilrs, self.active_gamepad, &self.rumble_queue)
        {
            self.rumble = Some(effect);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_and_shoulder_buttons_use_xbox_numbering() {
        assert_eq!(button_index(Button::South), Some(0));
        assert_eq!(button_index(Button::North), Some(3));
        assert_eq!(button_index(Button::RightTrigger), Some(5));
        assert_eq!(button_index(Button::RightThumb), Some(9));
        assert_eq!(button_index(Button::Mode), Some(10));
        assert_eq!(button_index(Button::DPadUp), None);
    }

    #[test]
    fn dpad_buttons_combine_into_hat_directions() {
        let mut dpad = DpadState::default();
        assert_eq!(dpad.set_button(Button::DPadUp, true), Some(HatDirection::Up));
        assert_eq!(dpad.set_button(Button::DPadRight, true), Some(HatDirection::UpRight));
        assert_eq!(dpad.set_button(Button::DPadRight, true), None);
        assert_eq!(dpad.set_button(Button::DPadUp, false), Some(HatDirection::Right));
        assert_eq!(dpad.set_button(Button::DPadRight, false), Some(HatDirection::Centered));
        assert_eq!(dpad.set_button(Button::South, true), None);
    }

    #[test]
    fn dpad_axes_map_to_hat_directions() {
        let mut dpad = DpadState::default();
        assert_eq!(dpad.set_axis(Axis::DPadY, -1.0), Some(HatDirection::Down));
        assert_eq!(dpad.set_axis(Axis::DPadX, -1.0), Some(HatDirection::DownLeft));
        assert_eq!(dpad.set_axis(Axis::DPadY, 0.0), Some(HatDirection::Left));
    }

    #[test]
    fn stick_y_axes_are_flipped_and_triggers_are_axes() {
        assert_eq!(stick_axis(Axis::LeftStickX), Some((0, false)));
        assert_eq!(stick_axis(Axis::LeftStickY), Some((1, true)));
        assert_eq!(stick_axis(Axis::RightStickY), Some((4, true)));
        assert_eq!(trigger_axis(Button::LeftTrigger2), Some(2));
        assert_eq!(trigger_axis(Button::RightTrigger2), Some(5));
        assert_eq!(trigger_axis(Button::LeftTrigger), None);
    }
}
