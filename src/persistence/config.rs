//! Startup configuration
//!
//! Read once before the router is built and handed to every component as an
//! immutable value. A missing or malformed file never stops startup: the
//! caller logs the returned error and continues with the defaults.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

pub const CONFIG_ENV_VAR: &str = "JOYMAPPER_CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "data/config.toml";
const CONFIG_DIR_NAME: &str = "joymapper";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file '{0}' does not exist")]
    Missing(PathBuf),

    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid options for module '{module}': {message}")]
    InvalidOptions { module: String, message: String },
}

/// Main configuration file
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct AppConfig {
    pub quiet: bool,
    pub ignore_multiple_buttons: bool,
    pub haptic_feedback: bool,
    pub switch_shortcut: Vec<u8>,
    pub modules: ModulesSection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            quiet: false,
            ignore_multiple_buttons: true,
            haptic_feedback: true,
            switch_shortcut: vec![4, 5, 8, 9],
            modules: ModulesSection::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ModulesSection {
    /// Path of the per-module configuration file
    pub config: PathBuf,
    pub blacklisted: Vec<String>,
    pub initial: String,
    pub skip_dummy_cycle: bool,
}

impl Default for ModulesSection {
    fn default() -> Self {
        Self {
            config: PathBuf::from("data/modules.toml"),
            blacklisted: Vec::new(),
            initial: "dummy".to_string(),
            skip_dummy_cycle: false,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        read_toml(path)
    }

    /// `$JOYMAPPER_CONFIG_FILE`, then `data/config.toml`, then the user config directory
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return PathBuf::from(path);
        }
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return local;
        }
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME).join("config.toml"))
            .filter(|path| path.exists())
            .unwrap_or(local)
    }

    pub fn is_blacklisted(&self, module: &str) -> bool {
        self.modules.blacklisted.iter().any(|name| name == module)
    }
}

/// `mappings` section of a module: `"index-or-direction" = "action"` per kind
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct MappingsConfig {
    pub button: BTreeMap<String, String>,
    pub hat: BTreeMap<String, String>,
    pub axis: BTreeMap<String, String>,
}

/// Configuration record of a single module
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ModuleConfig {
    pub options: toml::Table,
    pub mappings: MappingsConfig,
}

impl ModuleConfig {
    /// Deserializes the free-form options into a typed struct. Fields missing from
    /// the file keep the values of `T::default()` through `#[serde(default)]`.
    pub fn typed_options<T>(&self, module: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
    {
        toml::Value::Table(self.options.clone())
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::InvalidOptions {
                module: module.to_string(),
                message: e.to_string(),
            })
    }

    /// Like [`Self::typed_options`], falling back to defaults with a warning
    pub fn options_or_default<T>(&self, module: &str) -> T
    where
        T: DeserializeOwned + Default,
    {
        self.typed_options(module).unwrap_or_else(|e| {
            warn!(module, "{}, using defaults", e);
            T::default()
        })
    }
}

/// All module records keyed by module name
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct ModulesFile {
    pub modules: BTreeMap<String, ModuleConfig>,
}

impl ModulesFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        read_toml(path)
    }

    /// Record of a module, empty when the file has no table for it
    pub fn module(&self, name: &str) -> ModuleConfig {
        self.modules.get(name).cloned().unwrap_or_default()
    }
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Missing(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            quiet = true
            switch-shortcut = [6, 7]

            [modules]
            initial = "mouse"
            "#,
        )
        .unwrap();

        assert!(config.quiet);
        assert!(config.ignore_multiple_buttons);
        assert_eq!(config.switch_shortcut, vec![6, 7]);
        assert_eq!(config.modules.initial, "mouse");
        assert_eq!(config.modules.config, PathBuf::from("data/modules.toml"));
    }

    #[test]
    fn missing_file_is_reported() {
        let result = AppConfig::load(Path::new("/nonexistent/joymapper.toml"));
        assert!(matches!(result, Err(ConfigError::Missing(_))));
    }

    #[test]
    fn malformed_file_is_reported() {
        let path = std::env::temp_dir().join(format!("joymapper-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "quiet = \"very\"").unwrap();
        let result = AppConfig::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[derive(Deserialize, Debug, PartialEq)]
    #[serde(default, rename_all = "kebab-case")]
    struct Options {
        speed: f64,
        enabled: bool,
    }

    impl Default for Options {
        fn default() -> Self {
            Self {
                speed: 1.0,
                enabled: true,
            }
        }
    }

    #[test]
    fn module_records_merge_options_over_defaults() {
        let file: ModulesFile = toml::from_str(
            r#"
            [mouse.options]
            speed = 2.5

            [mouse.mappings.button]
            0 = "right"
            "#,
        )
        .unwrap();

        let mouse = file.module("mouse");
        let options: Options = mouse.options_or_default("mouse");
        assert_eq!(
            options,
            Options {
                speed: 2.5,
                enabled: true
            }
        );
        assert_eq!(mouse.mappings.button.get("0"), Some(&"right".to_string()));
        assert_eq!(file.module("media"), ModuleConfig::default());
    }

    #[test]
    fn invalid_options_fall_back_to_defaults() {
        let file: ModulesFile = toml::from_str("[mouse.options]\nspeed = \"fast\"").unwrap();
        let options: Options = file.module("mouse").options_or_default("mouse");
        assert_eq!(options, Options::default());
    }
}
