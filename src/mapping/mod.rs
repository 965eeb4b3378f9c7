//! Routing of controller events to interchangeable behavior modules.
//!
//! The [`InputRouter`] receives every [`KeyEvent`] from the event collector,
//! watches for the module switch chord and forwards everything else to the
//! module currently active in the [`ModuleRegistry`].

pub mod error;
pub mod key_event;
pub mod module;
pub mod registry;
pub mod router;

pub use error::{ModuleError, RegistryError};
pub use key_event::{HatDirection, InputKey, KeyEvent, KeyKind};
pub use module::{KeyMap, LifecycleState, Module, ModuleHost};
pub use registry::ModuleRegistry;
pub use router::{ChordSpec, InputRouter, RouterSettings};
