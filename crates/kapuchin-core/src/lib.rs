//! Startup patching framework for a 3D-printer host.
//!
//! A `[kapuchin]` section in `printer.cfg` activates the framework; every
//! `[patch <id>]` section then loads the plugin module `patches.<id>`, which
//! replaces attributes of host classes before the host finishes starting.
//! Replacements reach the code they replaced through [`call_original`].
pub mod extras;
pub mod host;
pub mod kernel;
pub mod patching;
pub mod plugin_system;

pub use kernel::Application;
pub use kernel::error::Error as KernelError;
pub use kernel::settings::KapuchinSettings;
pub use patching::{call_original, patch, patches, patches_named, ModuleScope, PatchRegistry};
pub use plugin_system::{bootstrap, bootstrap_with, BootstrapOptions, KapuchinManager, ModuleCatalog, PluginModule};

// Used by `register_plugin_module!`.
pub use inventory;
pub use serde_json;

#[cfg(test)]
mod tests;
