//! # Kapuchin Kernel Errors
//!
//! Defines [`Error`], the aggregate error of the crate, and the matching
//! [`Result`] alias. Each subsystem keeps its own typed error and converts
//! into this one with `?`:
//!
//! - host model calls: [`HostError`]
//! - patch registry, declarations and applier: [`PatchError`]
//! - plugin resolution, loading and bootstrap: [`PluginSystemError`]
use std::result::Result as StdResult;

use thiserror::Error as ThisError;

use crate::host::error::HostError;
use crate::patching::error::PatchError;
use crate::plugin_system::error::PluginSystemError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("Plugin system error: {0}")]
    PluginSystem(#[from] PluginSystemError),

    /// Reading or rendering an output format failed.
    #[error("Failed to serialize to {format}: {message}")]
    Serialization { format: String, message: String },

    #[error("Error: {0}")]
    Other(String),
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl Error {
    pub fn serialization(format: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Serialization {
            format: format.into(),
            message: message.to_string(),
        }
    }
}
