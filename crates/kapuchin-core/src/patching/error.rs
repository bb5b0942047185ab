//! # Kapuchin Patching Errors
//!
//! Defines [`PatchError`], raised by the patch registry, the declaration
//! builders, the applier and `call_original`.
//!
//! A double patch of the same attribute is not an error: the last applied
//! replacement is live and the first seen value stays the original.
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PatchError {
    /// `call_original` for an attribute that was never patched.
    #[error("No original stored for '{class}.{attribute}': the attribute was never patched")]
    OriginalNotFound { class: String, attribute: String },

    /// The attribute did not exist before it was patched, so there is no
    /// original to call (or to extend).
    #[error("'{class}.{attribute}' has no original value: it did not exist before patching")]
    NoOriginalValue { class: String, attribute: String },

    #[error("Patch target class '{0}' is not known to the host")]
    UnknownClass(String),

    /// A replacement without an explicit name whose identity gives no name
    /// (closures).
    #[error("Cannot derive an attribute name for a patch on '{class}' from '{type_name}'; give it an explicit name")]
    UnnamedReplacement { class: String, type_name: String },

    #[error("Patch registry is frozen; cannot record '{class}.{attribute}' after the load phase")]
    RegistryFrozen { class: String, attribute: String },
}

impl PatchError {
    /// Whether the error means a `call_original` target is missing.
    pub fn is_missing_original(&self) -> bool {
        matches!(self, PatchError::OriginalNotFound { .. } | PatchError::NoOriginalValue { .. })
    }
}

/// Result type for patching operations.
pub type PatchResult<T> = std::result::Result<T, PatchError>;
