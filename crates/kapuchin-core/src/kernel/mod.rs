//! # Kapuchin Kernel
//!
//! Crate-wide pieces shared by the other modules:
//!
//! - **[`bootstrap`]**: [`Application`], a stock host with kapuchin
//!   registered, as used by the CLI.
//! - **[`constants`]**: section, object and entry point names.
//! - **[`settings`]**: [`KapuchinSettings`], read from `[kapuchin]`.
//! - **[`error`]**: the aggregate [`Error`] and its `Result` alias.
pub mod bootstrap;
pub mod constants;
pub mod error;
pub mod settings;

pub use bootstrap::Application;
pub use error::{Error, Result};
pub use settings::KapuchinSettings;

// Test module declaration
#[cfg(test)]
mod tests;
