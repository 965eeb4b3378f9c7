//! Persisted credentials of the remote module

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("Failed to read secrets file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse secrets file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize secrets: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write secrets file '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Pairing key issued by the TV and its hardware address
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Secrets {
    pub key: Option<String>,
    pub mac_address: Option<String>,
}

pub trait SecretsStore: Send + Sync {
    fn load(&self) -> Result<Secrets, SecretsError>;
    fn save(&self, secrets: &Secrets) -> Result<(), SecretsError>;
}

/// TOML file backed store
#[derive(Debug, Clone)]
pub struct FileSecretsStore {
    path: PathBuf,
}

impl FileSecretsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SecretsStore for FileSecretsStore {
    fn load(&self) -> Result<Secrets, SecretsError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| SecretsError::Read {
            path: self.path.clone(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| SecretsError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, secrets: &Secrets) -> Result<(), SecretsError> {
        let content = toml::to_string_pretty(secrets)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| SecretsError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        std::fs::write(&self.path, content).map_err(|source| SecretsError::Write {
            path: self.path.clone(),
            source,
        })?;
        info!("saved secrets to '{}'", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("joymapper-secrets-{}", std::process::id()));
        let store = FileSecretsStore::new(dir.join("remote-secrets.toml"));
        let secrets = Secrets {
            key: Some("0123456789abcdef".into()),
            mac_address: None,
        };

        store.save(&secrets).unwrap();
        let loaded = store.load().unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(loaded, secrets);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let store = FileSecretsStore::new("/nonexistent/joymapper/secrets.toml");
        assert!(matches!(store.load(), Err(SecretsError::Read { .. })));
    }
}
