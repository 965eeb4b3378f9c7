//! Rumble feedback for the active gamepad
//!
//! The router only knows the [`Haptics`] interface. The gilrs backed
//! implementation queues patterns to the event collector, which owns the
//! `Gilrs` context and plays them between two events.

use gilrs::ff::{BaseEffect, BaseEffectType, EffectBuilder, Repeat, Replay, Ticks};
use gilrs::{GamepadId, Gilrs};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, warn};

/// A sequence of identical rumble pulses
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RumblePattern {
    /// Motor strength, `0.0..=1.0`
    pub strength: f32,
    pub duration: Duration,
    pub count: u32,
    /// Pause before each pulse
    pub delay: Duration,
}

impl RumblePattern {
    /// Single pulse played when a controller registers
    pub fn registered() -> Self {
        Self {
            strength: 0.5,
            duration: Duration::from_millis(500),
            count: 1,
            delay: Duration::ZERO,
        }
    }

    /// `position + 1` short pulses telling which module became active
    pub fn module_switch(position: usize) -> Self {
        Self {
            strength: 0.9,
            duration: Duration::from_millis(100),
            count: position as u32 + 1,
            delay: Duration::from_millis(250),
        }
    }

    fn total(&self) -> Duration {
        (self.delay + self.duration) * self.count
    }
}

pub trait Haptics: Send {
    fn rumble(&mut self, pattern: RumblePattern);
}

/// Discards every pattern
#[derive(Debug, Default)]
pub struct NoHaptics;

impl Haptics for NoHaptics {
    fn rumble(&mut self, _pattern: RumblePattern) {}
}

/// Sending half handed to the router
#[derive(Debug, Clone)]
pub struct HapticsQueue {
    sender: mpsc::Sender<RumblePattern>,
}

impl HapticsQueue {
    pub fn channel() -> (Self, mpsc::Receiver<RumblePattern>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl Haptics for HapticsQueue {
    fn rumble(&mut self, pattern: RumblePattern) {
        if self.sender.send(pattern).is_err() {
            debug!("haptics queue closed, dropping {:?}", pattern);
        }
    }
}

fn ticks(duration: Duration) -> Ticks {
    Ticks::from_ms(duration.as_millis().min(u32::MAX as u128) as u32)
}

/// Plays a pattern through gilrs force feedback. The returned effect must be kept
/// alive until it finished playing, dropping it stops the motors.
pub(crate) fn play(
    gilrs: &mut Gilrs,
    gamepad: GamepadId,
    pattern: RumblePattern,
) -> Result<gilrs::ff::Effect, gilrs::ff::Error> {
    let magnitude = (pattern.strength.clamp(0.0, 1.0) * u16::MAX as f32) as u16;
    let mut builder = EffectBuilder::new();
    for pulse in 0..pattern.count {
        let start = (pattern.delay + pattern.duration) * pulse + pattern.delay;
        builder.add_effect(BaseEffect {
            kind: BaseEffectType::Strong { magnitude },
            scheduling: Replay {
                after: ticks(start),
                play_for: ticks(pattern.duration),
                with_delay: Ticks::from_ms(0),
            },
            ..Default::default()
        });
    }
    let effect = builder
        .repeat(Repeat::For(ticks(pattern.total())))
        .gamepads(&[gamepad])
        .finish(gilrs)?;
    effect.play()?;
    Ok(effect)
}

/// Drains queued patterns and plays the most recent one
pub(crate) fn play_pending(
    gilrs: &mut Gilrs,
    gamepad: Option<GamepadId>,
    queue: &mpsc::Receiver<RumblePattern>,
) -> Option<gilrs::ff::Effect> {
    let pattern = queue.try_iter().last()?;
    let gamepad = gamepad?;
    if !gilrs.gamepad(gamepad).is_ff_supported() {
        debug!("gamepad {} has no force feedback", gamepad);
        return None;
    }
    match play(gilrs, gamepad, pattern) {
        Ok(effect) => Some(effect),
        Err(e) => {
            warn!("failed to play rumble: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_switch_pulses_once_per_position() {
        let pattern = RumblePattern::module_switch(2);
        assert_eq!(pattern.count, 3);
        assert_eq!(pattern.total(), Duration::from_millis(1050));
    }

    #[test]
    fn queue_forwards_patterns() {
        let (mut queue, receiver) = HapticsQueue::channel();
        queue.rumble(RumblePattern::registered());
        assert_eq!(receiver.try_recv(), Ok(RumblePattern::registered()));
    }
}
