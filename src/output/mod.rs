//! Keyboard and mouse emulation sinks
//!
//! Modules emit through [`KeyboardSink`] and [`MouseSink`]; the process wires in
//! the uinput backed [`uinput::VirtualInput`] which implements both.

pub mod uinput;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to create virtual device: {0}")]
    DeviceCreation(String),

    #[error("Failed to write event: {0}")]
    WriteError(String),

    #[error("Key cannot be emulated: {0}")]
    UnsupportedKey(String),
}

/// Keys the modules can tap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyboardKey {
    Up,
    Down,
    Left,
    Right,
    Enter,
    Escape,
    Tab,
    Space,
    Backspace,
    MediaVolumeUp,
    MediaVolumeDown,
    MediaVolumeMute,
    MediaPlayPause,
    MediaStop,
    MediaNext,
    MediaPrevious,
    /// A printable ASCII character, shifted variants included
    Char(char),
}

impl FromStr for KeyboardKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c.is_ascii_graphic() {
                return Ok(KeyboardKey::Char(c));
            }
        }

        let key = match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "up" => KeyboardKey::Up,
            "down" => KeyboardKey::Down,
            "left" => KeyboardKey::Left,
            "right" => KeyboardKey::Right,
            "enter" | "return" => KeyboardKey::Enter,
            "esc" | "escape" => KeyboardKey::Escape,
            "tab" => KeyboardKey::Tab,
            "space" => KeyboardKey::Space,
            "backspace" => KeyboardKey::Backspace,
            "media_volume_up" => KeyboardKey::MediaVolumeUp,
            "media_volume_down" => KeyboardKey::MediaVolumeDown,
            "media_volume_mute" => KeyboardKey::MediaVolumeMute,
            "media_play_pause" => KeyboardKey::MediaPlayPause,
            "media_stop" => KeyboardKey::MediaStop,
            "media_next" => KeyboardKey::MediaNext,
            "media_previous" => KeyboardKey::MediaPrevious,
            other => return Err(format!("unknown key '{}'", other)),
        };
        Ok(key)
    }
}

impl fmt::Display for KeyboardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyboardKey::Char(c) => write!(f, "'{}'", c),
            other => write!(f, "{:?}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl FromStr for MouseButton {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(MouseButton::Left),
            "right" => Ok(MouseButton::Right),
            "middle" => Ok(MouseButton::Middle),
            other => Err(format!("unknown mouse button '{}'", other)),
        }
    }
}

/// Keyboard emulation. `press` taps the key (press followed by release).
pub trait KeyboardSink: Send + Sync {
    fn press(&self, key: KeyboardKey) -> Result<(), OutputError>;
}

/// Mouse emulation. Deltas are fractional; sinks keep the sub-unit remainder.
pub trait MouseSink: Send + Sync {
    fn press(&self, button: MouseButton) -> Result<(), OutputError>;
    fn release(&self, button: MouseButton) -> Result<(), OutputError>;
    fn move_by(&self, dx: f64, dy: f64) -> Result<(), OutputError>;
    fn scroll(&self, dx: f64, dy: f64) -> Result<(), OutputError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording sinks for unit tests

    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum MouseCall {
        Press(MouseButton),
        Release(MouseButton),
        Move(f64, f64),
        Scroll(f64, f64),
    }

    #[derive(Default)]
    pub struct RecordingKeyboard {
        pub pressed: Mutex<Vec<KeyboardKey>>,
    }

    impl KeyboardSink for RecordingKeyboard {
        fn press(&self, key: KeyboardKey) -> Result<(), OutputError> {
            self.pressed.lock().unwrap().push(key);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct RecordingMouse {
        pub calls: Mutex<Vec<MouseCall>>,
    }

    impl RecordingMouse {
        pub fn calls(&self) -> Vec<MouseCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn moves(&self) -> Vec<(f64, f64)> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    MouseCall::Move(dx, dy) => Some((dx, dy)),
                    _ => None,
                })
                .collect()
        }
    }

    impl MouseSink for RecordingMouse {
        fn press(&self, button: MouseButton) -> Result<(), OutputError> {
            self.calls.lock().unwrap().push(MouseCall::Press(button));
            Ok(())
        }

        fn release(&self, button: MouseButton) -> Result<(), OutputError> {
            self.calls.lock().unwrap().push(MouseCall::Release(button));
            Ok(())
        }

        fn move_by(&self, dx: f64, dy: f64) -> Result<(), OutputError> {
            self.calls.lock().unwrap().push(MouseCall::Move(dx, dy));
            Ok(())
        }

        fn scroll(&self, dx: f64, dy: f64) -> Result<(), OutputError> {
            self.calls.lock().unwrap().push(MouseCall::Scroll(dx, dy));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_names_and_characters() {
        assert_eq!("G".parse::<KeyboardKey>(), Ok(KeyboardKey::Char('G')));
        assert_eq!("]".parse::<KeyboardKey>(), Ok(KeyboardKey::Char(']')));
        assert_eq!("media_volume_up".parse::<KeyboardKey>(), Ok(KeyboardKey::MediaVolumeUp));
        assert_eq!("Enter".parse::<KeyboardKey>(), Ok(KeyboardKey::Enter));
        assert!("hyper".parse::<KeyboardKey>().is_err());
    }
}
