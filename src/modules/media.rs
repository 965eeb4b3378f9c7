//! Media module: buttons and the d-pad tap keyboard and media keys

use crate::mapping::{HatDirection, KeyEvent, KeyMap, Module, ModuleError};
use crate::output::{KeyboardKey, KeyboardSink};
use crate::persistence::ModuleConfig;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Media {
    keyboard: Arc<dyn KeyboardSink>,
    mappings: KeyMap<KeyboardKey>,
}

impl Media {
    pub const NAME: &'static str = "media";

    pub fn new(keyboard: Arc<dyn KeyboardSink>, config: &ModuleConfig) -> Self {
        let mut mappings = Self::default_mappings();
        mappings.apply_overrides(Self::NAME, &config.mappings);
        Self { keyboard, mappings }
    }

    pub fn default_mappings() -> KeyMap<KeyboardKey> {
        KeyMap::new()
            .hat(HatDirection::Up, KeyboardKey::Up)
            .hat(HatDirection::Down, KeyboardKey::Down)
            .hat(HatDirection::Left, KeyboardKey::Left)
            .hat(HatDirection::Right, KeyboardKey::Right)
            .button(0, KeyboardKey::Char('G')) // A
            .button(1, KeyboardKey::Char(']')) // B
            .button(2, KeyboardKey::Char('[')) // X
            .button(3, KeyboardKey::Char('H')) // Y
            .button(4, KeyboardKey::MediaVolumeDown) // left bumper
            .button(5, KeyboardKey::MediaVolumeUp) // right bumper
            .button(6, KeyboardKey::MediaStop) // back
            .button(7, KeyboardKey::MediaPlayPause) // start
            .button(8, KeyboardKey::Char('V')) // left stick
    }
}

impl Module for Media {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn load(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }

    fn unload(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }

    fn on_key(&mut self, event: &KeyEvent) {
        let Some(key) = self.mappings.resolve(event).copied() else {
            return;
        };
        info!(module = Self::NAME, "pressing {}", key);
        if let Err(e) = self.keyboard.press(key) {
            warn!(module = Self::NAME, "failed to press {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::testing::RecordingKeyboard;
    use crate::persistence::MappingsConfig;
    use std::collections::BTreeMap;

    #[test]
    fn taps_mapped_keys_on_press_only() {
        let keyboard = Arc::new(RecordingKeyboard::default());
        let mut media = Media::new(keyboard.clone(), &ModuleConfig::default());

        media.on_key(&KeyEvent::button(5, true));
        media.on_key(&KeyEvent::button(5, false));
        media.on_key(&KeyEvent::hat(0, HatDirection::Left));
        media.on_key(&KeyEvent::hat(0, HatDirection::Centered));
        media.on_key(&KeyEvent::button(9, true));

        assert_eq!(
            *keyboard.pressed.lock().unwrap(),
            vec![KeyboardKey::MediaVolumeUp, KeyboardKey::Left]
        );
    }

    #[test]
    fn config_overrides_default_bindings() {
        let keyboard = Arc::new(RecordingKeyboard::default());
        let config = ModuleConfig {
            mappings: MappingsConfig {
                button: BTreeMap::from([("0".to_string(), "space".to_string())]),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut media = Media::new(keyboard.clone(), &config);

        media.on_key(&KeyEvent::button(0, true));

        assert_eq!(*keyboard.pressed.lock().unwrap(), vec![KeyboardKey::Space]);
    }
}
