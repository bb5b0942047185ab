//! # Kapuchin Host Model Errors
//!
//! Defines [`HostError`], the error type returned by every call that goes
//! through the host's dispatch tables: method calls on [`Instance`](super::Instance),
//! configuration access, printer object registration and G-code dispatch.
//!
//! Patch and plugin errors raised from inside a host call (for example a
//! replacement method calling `call_original` on an unpatched key) are carried
//! through unchanged in the [`HostError::Patch`] and [`HostError::Plugin`] variants.
use std::path::PathBuf;
use thiserror::Error;

use crate::patching::error::PatchError;
use crate::plugin_system::error::PluginSystemError;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Error reading config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error on line {line}: {message}")]
    ConfigParse { line: usize, message: String },

    #[error("Section '{0}' not found")]
    MissingSection(String),

    #[error("Option '{option}' in section '{section}' must be specified")]
    MissingOption { section: String, option: String },

    #[error("Unable to parse option '{option}' in section '{section}': {message}")]
    InvalidOption {
        section: String,
        option: String,
        message: String,
    },

    #[error("Section '{0}' is not a valid config section")]
    InvalidSection(String),

    #[error("Option '{option}' is not valid in section '{section}'")]
    UnusedOption { section: String, option: String },

    #[error("'{class}' object has no attribute '{attribute}'")]
    AttributeMissing { class: String, attribute: String },

    #[error("Argument {index} of '{method}' is missing or has the wrong type")]
    BadArgument { method: String, index: usize },

    #[error("Printer object '{0}' already registered")]
    DuplicateObject(String),

    #[error("Printer object '{0}' not found")]
    ObjectNotFound(String),

    #[error("Host class '{0}' not found")]
    ClassNotFound(String),

    #[error("Unknown command: \"{0}\"")]
    UnknownCommand(String),

    #[error("Command '{0}' already registered")]
    DuplicateCommand(String),

    #[error("{0}")]
    Command(String),

    #[error("Printer has been shut down")]
    PrinterGone,

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Plugin(Box<PluginSystemError>),

    #[error("Host error: {0}")]
    Other(String),
}

impl From<PluginSystemError> for HostError {
    fn from(err: PluginSystemError) -> Self {
        HostError::Plugin(Box::new(err))
    }
}

impl HostError {
    /// Error raised by a G-code command handler, reported back to the user.
    pub fn command(message: impl Into<String>) -> Self {
        HostError::Command(message.into())
    }

    /// Config error attached to a specific option.
    pub fn invalid_option(section: &str, option: &str, message: impl Into<String>) -> Self {
        HostError::InvalidOption {
            section: section.to_string(),
            option: option.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for host calls.
pub type HostResult<T> = std::result::Result<T, HostError>;
