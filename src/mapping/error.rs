//! Error definitions for the mapping layer

use thiserror::Error;

/// Errors raised by module lifecycle hooks
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Acquiring a background resource failed
    #[error("Initialization error: {0}")]
    InitializationError(String),

    /// A background worker could not be started or stopped
    #[error("Thread error: {0}")]
    ThreadError(String),

    /// Emulation output failed
    #[error("Output error: {0}")]
    Output(#[from] crate::output::OutputError),

    /// Remote control connection failed
    #[error("Remote error: {0}")]
    Remote(#[from] crate::modules::remote::RemoteError),

    /// A module hook panicked
    #[error("Module panicked: {0}")]
    Panicked(String),
}

/// Errors raised while building the module registry
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("A module named '{0}' is already registered")]
    DuplicateName(String),

    #[error("Unknown module index {0}")]
    UnknownIndex(usize),
}
