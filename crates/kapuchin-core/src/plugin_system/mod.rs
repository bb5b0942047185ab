//! # Kapuchin Plugin System
//!
//! Finds `[patch ...]` sections in the printer config, imports the matching
//! plugin modules, applies their patch declarations and runs their entry
//! points.
//!
//! ## Key Submodules and Responsibilities:
//!
//! - **[`module`]**: [`PluginModule`], the static description of a plugin
//!   crate, the [`register_plugin_module!`](crate::register_plugin_module)
//!   macro and the [`ModuleCatalog`] of every linked module.
//! - **[`descriptor`]**: [`resolve`] turns config sections into
//!   [`PluginDescriptor`]s, in file order.
//! - **[`loader`]**: [`PluginLoader`] imports, patches, initializes and
//!   registers each plugin, isolating failures per section.
//! - **[`bootstrap`]**: patching the class of a host object that already
//!   exists when the plugin section is loaded.
//! - **[`manager`]**: [`KapuchinManager`], the printer object that drives a
//!   load and reports its outcome.
//! - **[`error`]**: [`PluginSystemError`].
pub mod bootstrap;
pub mod descriptor;
pub mod error;
pub mod loader;
pub mod manager;
pub mod module;

pub use bootstrap::{bootstrap, bootstrap_with, BootstrapOptions, BootstrappedPlugin};
pub use descriptor::{resolve, InitForm, PluginDescriptor};
pub use error::{PluginResult, PluginSystemError};
pub use loader::{LoadReport, PluginLoader};
pub use manager::KapuchinManager;
pub use module::{ImportFn, ImportedModule, InitFn, ModuleCatalog, PluginModule};

// Test module declaration
#[cfg(test)]
mod tests;
