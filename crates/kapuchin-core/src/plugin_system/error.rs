//! # Kapuchin Plugin System Errors
//!
//! Defines [`PluginSystemError`], raised while resolving `[patch ...]`
//! sections, importing plugin modules, applying their declarations, running
//! their entry points and bootstrapping them against live host objects.
//!
//! Every variant raised for a specific section carries the section name so
//! the loader can log it and acknowledge the section.
use crate::host::error::HostError;
use crate::patching::error::PatchError;

#[derive(Debug, thiserror::Error)]
pub enum PluginSystemError {
    /// No module for a plugin section, or no host object for a bootstrap.
    #[error("'{name}' could not be found: {message}")]
    Discovery {
        name: String,
        section: Option<String>,
        message: String,
    },

    #[error("Invalid plugin section '[{section}]': {message}")]
    InvalidSection { section: String, message: String },

    #[error("Failed to import '{module}' for '[{section}]': {source}")]
    Import {
        section: String,
        module: String,
        #[source]
        source: Box<HostError>,
    },

    #[error("Module '{module}' for '[{section}]' does not define '{expected}'")]
    MissingEntryPoint {
        section: String,
        module: String,
        expected: &'static str,
    },

    #[error("Module '{module}' for '[{section}]' defines both 'load_config' and 'load_config_prefix'")]
    AmbiguousEntryPoint { section: String, module: String },

    #[error("Failed to apply patches from '{module}' for '[{section}]': {source}")]
    Patch {
        section: String,
        module: String,
        #[source]
        source: PatchError,
    },

    #[error("Initialization of '[{section}]' failed: {source}")]
    Initialization {
        section: String,
        #[source]
        source: Box<HostError>,
    },

    #[error("Registration of '[{section}]' failed: {source}")]
    Registration {
        section: String,
        #[source]
        source: Box<HostError>,
    },

    /// The host object named in a bootstrap is not a class instance.
    #[error("Host object '{object}' cannot be patched: {message}")]
    NotPatchable { object: String, message: String },

    /// Plugin sections were found but the `[kapuchin]` section is missing.
    #[error("Kapuchin is not activated: {0}")]
    NotActivated(String),

    #[error("Host error while loading plugins: {0}")]
    Host(#[source] Box<HostError>),
}

impl PluginSystemError {
    /// The config section the error belongs to, if any.
    pub fn section(&self) -> Option<&str> {
        match self {
            PluginSystemError::InvalidSection { section, .. }
            | PluginSystemError::Import { section, .. }
            | PluginSystemError::MissingEntryPoint { section, .. }
            | PluginSystemError::AmbiguousEntryPoint { section, .. }
            | PluginSystemError::Patch { section, .. }
            | PluginSystemError::Initialization { section, .. }
            | PluginSystemError::Registration { section, .. } => Some(section),
            PluginSystemError::Discovery { section, .. } => section.as_deref(),
            PluginSystemError::NotPatchable { .. }
            | PluginSystemError::NotActivated(_)
            | PluginSystemError::Host(_) => None,
        }
    }

    pub fn import(section: &str, module: &str, source: HostError) -> Self {
        PluginSystemError::Import {
            section: section.to_string(),
            module: module.to_string(),
            source: Box::new(source),
        }
    }
}

impl From<HostError> for PluginSystemError {
    fn from(error: HostError) -> Self {
        PluginSystemError::Host(Box::new(error))
    }
}

/// Result type for plugin system operations.
pub type PluginResult<T> = std::result::Result<T, PluginSystemError>;
