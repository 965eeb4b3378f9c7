//! Configuration and secrets persistence
//!
//! Everything here is plain TOML through serde. Configuration is read once at
//! startup; the secrets file is rewritten by the remote module whenever the TV
//! rotates its pairing key or the hardware address is discovered.

pub mod config;
pub mod secrets;

pub use config::{AppConfig, ConfigError, MappingsConfig, ModuleConfig, ModulesFile};
pub use secrets::{FileSecretsStore, Secrets, SecretsError, SecretsStore};
