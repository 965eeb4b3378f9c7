//! Game controller to keyboard, mouse and smart-TV remote mapper
//!
//! Controller events are routed to one active behavior module at a time. A
//! button chord cycles through the modules; each module turns events into
//! emulated keyboard or mouse input, or into commands for a networked TV.

pub mod controller;
pub mod mapping;
pub mod modules;
pub mod output;
pub mod persistence;
