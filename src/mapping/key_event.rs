//! Shared input vocabulary between the event collector, the router and the modules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of control that produced a [`KeyEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyKind {
    Button,
    Hat,
    Axis,
}

/// A single raw controller event.
///
/// Buttons carry `0.0`/`1.0`, hats carry their direction bits (see [`HatDirection`])
/// and axes a continuous value in `-1.0..=1.0` (triggers `0.0..=1.0`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyEvent {
    pub kind: KeyKind,
    pub index: u8,
    pub value: f32,
}

impl KeyEvent {
    pub fn button(index: u8, pressed: bool) -> Self {
        Self {
            kind: KeyKind::Button,
            index,
            value: if pressed { 1.0 } else { 0.0 },
        }
    }

    pub fn hat(index: u8, direction: HatDirection) -> Self {
        Self {
            kind: KeyKind::Hat,
            index,
            value: direction.bits() as f32,
        }
    }

    pub fn axis(index: u8, value: f32) -> Self {
        Self {
            kind: KeyKind::Axis,
            index,
            value,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.value != 0.0
    }

    /// Direction of a hat event, `None` for any other kind
    pub fn hat_direction(&self) -> Option<HatDirection> {
        match self.kind {
            KeyKind::Hat => HatDirection::from_bits(self.value as u8),
            _ => None,
        }
    }

    /// Lookup key used by mapping tables: hats are keyed by direction, the rest by index.
    pub fn input_key(&self) -> Option<InputKey> {
        match self.kind {
            KeyKind::Button => Some(InputKey::Button(self.index)),
            KeyKind::Axis => Some(InputKey::Axis(self.index)),
            KeyKind::Hat => self.hat_direction().map(InputKey::Hat),
        }
    }
}

// Hat direction bits
const HAT_UP: u8 = 0x01;
const HAT_RIGHT: u8 = 0x02;
const HAT_DOWN: u8 = 0x04;
const HAT_LEFT: u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HatDirection {
    Centered,
    Up,
    Right,
    Down,
    Left,
    UpRight,
    DownRight,
    DownLeft,
    UpLeft,
}

impl HatDirection {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Centered),
            HAT_UP => Some(Self::Up),
            HAT_RIGHT => Some(Self::Right),
            HAT_DOWN => Some(Self::Down),
            HAT_LEFT => Some(Self::Left),
            b if b == HAT_UP | HAT_RIGHT => Some(Self::UpRight),
            b if b == HAT_DOWN | HAT_RIGHT => Some(Self::DownRight),
            b if b == HAT_DOWN | HAT_LEFT => Some(Self::DownLeft),
            b if b == HAT_UP | HAT_LEFT => Some(Self::UpLeft),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Self::Centered => 0,
            Self::Up => HAT_UP,
            Self::Right => HAT_RIGHT,
            Self::Down => HAT_DOWN,
            Self::Left => HAT_LEFT,
            Self::UpRight => HAT_UP | HAT_RIGHT,
            Self::DownRight => HAT_DOWN | HAT_RIGHT,
            Self::DownLeft => HAT_DOWN | HAT_LEFT,
            Self::UpLeft => HAT_UP | HAT_LEFT,
        }
    }

    /// Combines the currently held d-pad buttons into a single direction.
    /// Opposite directions cancel each other out.
    pub fn from_dpad(up: bool, right: bool, down: bool, left: bool) -> Self {
        let mut bits = 0;
        if up && !down {
            bits |= HAT_UP;
        }
        if down && !up {
            bits |= HAT_DOWN;
        }
        if right && !left {
            bits |= HAT_RIGHT;
        }
        if left && !right {
            bits |= HAT_LEFT;
        }
        Self::from_bits(bits).unwrap_or(Self::Centered)
    }
}

impl FromStr for HatDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "centered" | "center" => Ok(Self::Centered),
            "up" => Ok(Self::Up),
            "right" => Ok(Self::Right),
            "down" => Ok(Self::Down),
            "left" => Ok(Self::Left),
            "upright" => Ok(Self::UpRight),
            "downright" => Ok(Self::DownRight),
            "downleft" => Ok(Self::DownLeft),
            "upleft" => Ok(Self::UpLeft),
            other => Err(format!("unknown hat direction '{}'", other)),
        }
    }
}

/// Key of a mapping table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputKey {
    Button(u8),
    Hat(HatDirection),
    Axis(u8),
}

impl fmt::Display for InputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKey::Button(index) => write!(f, "button {}", index),
            InputKey::Hat(direction) => write!(f, "hat {:?}", direction),
            InputKey::Axis(index) => write!(f, "axis {}", index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hat_bits_round_trip_through_direction() {
        assert_eq!(HatDirection::from_bits(0x03), Some(HatDirection::UpRight));
        assert_eq!(HatDirection::from_bits(0x05), None);
        assert_eq!(HatDirection::UpLeft.bits(), 0x09);
    }

    #[test]
    fn dpad_opposites_cancel() {
        assert_eq!(
            HatDirection::from_dpad(true, false, true, false),
            HatDirection::Centered
        );
        assert_eq!(
            HatDirection::from_dpad(false, true, true, false),
            HatDirection::DownRight
        );
    }

    #[test]
    fn hat_events_are_keyed_by_direction() {
        let event = KeyEvent::hat(0, HatDirection::Left);
        assert_eq!(event.input_key(), Some(InputKey::Hat(HatDirection::Left)));
        assert_eq!(KeyEvent::axis(3, 0.4).input_key(), Some(InputKey::Axis(3)));
    }

    #[test]
    fn parses_hat_names_from_config() {
        assert_eq!("down-left".parse::<HatDirection>(), Ok(HatDirection::DownLeft));
        assert!("sideways".parse::<HatDirection>().is_err());
    }
}
