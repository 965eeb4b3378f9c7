//! Controller subsystem for gamepad input handling
//!
//! ```text
//! Gamepad ──► EventCollector ──► InputRouter ──► active module
//!                   ▲                 │
//!                   └──── rumble ─────┘
//! ```
//!
//! Everything runs on one controller thread: the collector converts gilrs
//! events and calls the router synchronously, and plays rumble patterns the
//! router queued between two events.

pub mod controller_handle;
pub mod event_collector;
pub mod haptics;

pub use controller_handle::{ControllerError, ControllerHandle, ControllerSettings};
pub use event_collector::{CollectorError, CollectorSettings};
pub use haptics::{Haptics, HapticsQueue, NoHaptics, RumblePattern};
