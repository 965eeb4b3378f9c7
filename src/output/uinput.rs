//! Virtual uinput device used for keyboard and mouse emulation

use super::{KeyboardKey, KeyboardSink, MouseButton, MouseSink, OutputError};
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key, RelativeAxisType};
use parking_lot::Mutex;
use tracing::{debug, info};

const LETTERS: [Key; 26] = [
    Key::KEY_A, Key::KEY_B, Key::KEY_C, Key::KEY_D, Key::KEY_E, Key::KEY_F, Key::KEY_G,
    Key::KEY_H, Key::KEY_I, Key::KEY_J, Key::KEY_K, Key::KEY_L, Key::KEY_M, Key::KEY_N,
    Key::KEY_O, Key::KEY_P, Key::KEY_Q, Key::KEY_R, Key::KEY_S, Key::KEY_T, Key::KEY_U,
    Key::KEY_V, Key::KEY_W, Key::KEY_X, Key::KEY_Y, Key::KEY_Z,
];

const DIGITS: [Key; 10] = [
    Key::KEY_0, Key::KEY_1, Key::KEY_2, Key::KEY_3, Key::KEY_4, Key::KEY_5, Key::KEY_6,
    Key::KEY_7, Key::KEY_8, Key::KEY_9,
];

const NAMED: [Key; 20] = [
    Key::KEY_UP,
    Key::KEY_DOWN,
    Key::KEY_LEFT,
    Key::KEY_RIGHT,
    Key::KEY_ENTER,
    Key::KEY_ESC,
    Key::KEY_TAB,
    Key::KEY_SPACE,
    Key::KEY_BACKSPACE,
    Key::KEY_VOLUMEUP,
    Key::KEY_VOLUMEDOWN,
    Key::KEY_MUTE,
    Key::KEY_PLAYPAUSE,
    Key::KEY_STOPCD,
    Key::KEY_NEXTSONG,
    Key::KEY_PREVIOUSSONG,
    Key::KEY_LEFTSHIFT,
    Key::BTN_LEFT,
    Key::BTN_RIGHT,
    Key::BTN_MIDDLE,
];

const PUNCTUATION: [Key; 11] = [
    Key::KEY_MINUS,
    Key::KEY_EQUAL,
    Key::KEY_LEFTBRACE,
    Key::KEY_RIGHTBRACE,
    Key::KEY_BACKSLASH,
    Key::KEY_SEMICOLON,
    Key::KEY_APOSTROPHE,
    Key::KEY_GRAVE,
    Key::KEY_COMMA,
    Key::KEY_DOT,
    Key::KEY_SLASH,
];

/// Resolves a character to its US layout key and whether shift is needed
fn char_key(c: char) -> Option<(Key, bool)> {
    if c.is_ascii_lowercase() {
        return Some((LETTERS[(c as u8 - b'a') as usize], false));
    }
    if c.is_ascii_uppercase() {
        return Some((LETTERS[(c as u8 - b'A') as usize], true));
    }
    if c.is_ascii_digit() {
        return Some((DIGITS[(c as u8 - b'0') as usize], false));
    }
    let mapped = match c {
        '-' => (Key::KEY_MINUS, false),
        '_' => (Key::KEY_MINUS, true),
        '=' => (Key::KEY_EQUAL, false),
        '+' => (Key::KEY_EQUAL, true),
        '[' => (Key::KEY_LEFTBRACE, false),
        '{' => (Key::KEY_LEFTBRACE, true),
        ']' => (Key::KEY_RIGHTBRACE, false),
        '}' => (Key::KEY_RIGHTBRACE, true),
        '\\' => (Key::KEY_BACKSLASH, false),
        '|' => (Key::KEY_BACKSLASH, true),
        ';' => (Key::KEY_SEMICOLON, false),
        ':' => (Key::KEY_SEMICOLON, true),
        '\'' => (Key::KEY_APOSTROPHE, false),
        '"' => (Key::KEY_APOSTROPHE, true),
        '`' => (Key::KEY_GRAVE, false),
        '~' => (Key::KEY_GRAVE, true),
        ',' => (Key::KEY_COMMA, false),
        '<' => (Key::KEY_COMMA, true),
        '.' => (Key::KEY_DOT, false),
        '>' => (Key::KEY_DOT, true),
        '/' => (Key::KEY_SLASH, false),
        '?' => (Key::KEY_SLASH, true),
        '!' => (Key::KEY_1, true),
        '@' => (Key::KEY_2, true),
        '#' => (Key::KEY_3, true),
        '$' => (Key::KEY_4, true),
        '%' => (Key::KEY_5, true),
        '^' => (Key::KEY_6, true),
        '&' => (Key::KEY_7, true),
        '*' => (Key::KEY_8, true),
        '(' => (Key::KEY_9, true),
        ')' => (Key::KEY_0, true),
        _ => return None,
    };
    Some(mapped)
}

fn resolve_key(key: KeyboardKey) -> Option<(Key, bool)> {
    let code = match key {
        KeyboardKey::Up => Key::KEY_UP,
        KeyboardKey::Down => Key::KEY_DOWN,
        KeyboardKey::Left => Key::KEY_LEFT,
        KeyboardKey::Right => Key::KEY_RIGHT,
        KeyboardKey::Enter => Key::KEY_ENTER,
        KeyboardKey::Escape => Key::KEY_ESC,
        KeyboardKey::Tab => Key::KEY_TAB,
        KeyboardKey::Space => Key::KEY_SPACE,
        KeyboardKey::Backspace => Key::KEY_BACKSPACE,
        KeyboardKey::MediaVolumeUp => Key::KEY_VOLUMEUP,
        KeyboardKey::MediaVolumeDown => Key::KEY_VOLUMEDOWN,
        KeyboardKey::MediaVolumeMute => Key::KEY_MUTE,
        KeyboardKey::MediaPlayPause => Key::KEY_PLAYPAUSE,
        KeyboardKey::MediaStop => Key::KEY_STOPCD,
        KeyboardKey::MediaNext => Key::KEY_NEXTSONG,
        KeyboardKey::MediaPrevious => Key::KEY_PREVIOUSSONG,
        KeyboardKey::Char(c) => return char_key(c),
    };
    Some((code, false))
}

fn button_key(button: MouseButton) -> Key {
    match button {
        MouseButton::Left => Key::BTN_LEFT,
        MouseButton::Right => Key::BTN_RIGHT,
        MouseButton::Middle => Key::BTN_MIDDLE,
    }
}

/// Splits a fractional delta into whole units, keeping the rest for the next call
fn take_whole(remainder: &mut f64, delta: f64) -> i32 {
    *remainder += delta;
    let whole = remainder.trunc();
    *remainder -= whole;
    whole as i32
}

struct DeviceState {
    device: VirtualDevice,
    pointer_remainder: (f64, f64),
    scroll_remainder: (f64, f64),
}

impl DeviceState {
    fn emit(&mut self, events: &[InputEvent]) -> Result<(), OutputError> {
        self.device
            .emit(events)
            .map_err(|e: std::io::Error| OutputError::WriteError(e.to_string()))
    }

    fn key(&mut self, key: Key, value: i32) -> Result<(), OutputError> {
        self.emit(&[InputEvent::new(EventType::KEY, key.code(), value)])
    }
}

/// One virtual device exposing keyboard keys, mouse buttons and relative axes
pub struct VirtualInput {
    state: Mutex<DeviceState>,
}

impl VirtualInput {
    pub fn new(name: &str) -> Result<Self, OutputError> {
        let mut keys = AttributeSet::<Key>::new();
        for key in LETTERS.iter().chain(&DIGITS).chain(&NAMED).chain(&PUNCTUATION) {
            keys.insert(*key);
        }
        let mut axes = AttributeSet::<RelativeAxisType>::new();
        axes.insert(RelativeAxisType::REL_X);
        axes.insert(RelativeAxisType::REL_Y);
        axes.insert(RelativeAxisType::REL_WHEEL);
        axes.insert(RelativeAxisType::REL_HWHEEL);

        let device = VirtualDeviceBuilder::new()
            .map_err(|e: std::io::Error| OutputError::DeviceCreation(e.to_string()))?
            .name(name)
            .with_keys(&keys)
            .map_err(|e: std::io::Error| OutputError::DeviceCreation(e.to_string()))?
            .with_relative_axes(&axes)
            .map_err(|e: std::io::Error| OutputError::DeviceCreation(e.to_string()))?
            .build()
            .map_err(|e: std::io::Error| OutputError::DeviceCreation(e.to_string()))?;

        info!("Created virtual input device '{}'", name);
        Ok(Self {
            state: Mutex::new(DeviceState {
                device,
                pointer_remainder: (0.0, 0.0),
                scroll_remainder: (0.0, 0.0),
            }),
        })
    }
}

impl KeyboardSink for VirtualInput {
    fn press(&self, key: KeyboardKey) -> Result<(), OutputError> {
        let (code, shift) =
            resolve_key(key).ok_or_else(|| OutputError::UnsupportedKey(key.to_string()))?;
        debug!("Tapping {:?} (shift: {})", code, shift);

        let mut state = self.state.lock();
        if shift {
            state.key(Key::KEY_LEFTSHIFT, 1)?;
        }
        state.key(code, 1)?;
        state.key(code, 0)?;
        if shift {
            state.key(Key::KEY_LEFTSHIFT, 0)?;
        }
        Ok(())
    }
}

impl MouseSink for VirtualInput {
    fn press(&self, button: MouseButton) -> Result<(), OutputError> {
        self.state.lock().key(button_key(button), 1)
    }

    fn release(&self, button: MouseButton) -> Result<(), OutputError> {
        self.state.lock().key(button_key(button), 0)
    }

    fn move_by(&self, dx: f64, dy: f64) -> Result<(), OutputError> {
        let mut state = self.state.lock();
        let x = take_whole(&mut state.pointer_remainder.0, dx);
        let y = take_whole(&mut state.pointer_remainder.1, dy);
        if x == 0 && y == 0 {
            return Ok(());
        }
        state.emit(&[
            InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_X.0, x),
            InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_Y.0, y),
        ])
    }

    fn scroll(&self, dx: f64, dy: f64) -> Result<(), OutputError> {
        let mut state = self.state.lock();
        let x = take_whole(&mut state.scroll_remainder.0, dx);
        let y = take_whole(&mut state.scroll_remainder.1, dy);
        if x == 0 && y == 0 {
            return Ok(());
        }
        // REL_WHEEL is positive when scrolling up
        state.emit(&[
            InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_HWHEEL.0, x),
            InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_WHEEL.0, y),
        ])
    }
}
