//! Bootstrap helper for plugins that patch a host object which already
//! exists when the plugin's section is loaded.
//!
//! `[printer]` creates `toolhead` before any `[patch ...]` section is read,
//! so a plugin patching `ToolHead` has to find the live object, patch its
//! class and then fix up the instance itself. [`bootstrap`] does the first
//! two steps; the hooks in [`BootstrapOptions`] cover the rest.
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::host::config::ConfigSection;
use crate::host::error::{HostError, HostResult};
use crate::host::instance::Instance;
use crate::host::printer::{AsAny, PrinterObject};
use crate::kernel::constants::MANAGER_OBJECT;
use crate::patching::applier::PatchApplier;
use crate::patching::registry::PatchRegistry;
use crate::plugin_system::error::{PluginResult, PluginSystemError};
use crate::plugin_system::manager::KapuchinManager;
use crate::plugin_system::module::PluginModule;

/// Hook run against the live host object.
pub type BootstrapHook<'a> = &'a dyn Fn(&Arc<Instance>) -> HostResult<()>;

/// Optional extras for [`bootstrap_with`].
#[derive(Default)]
pub struct BootstrapOptions<'a> {
    /// Runs before the class is patched, e.g. to capture original state.
    pub before_patch: Option<BootstrapHook<'a>>,
    /// Runs after the class is patched, e.g. to re-run a patched method.
    pub after_patch: Option<BootstrapHook<'a>>,
    /// Extra fields merged into the returned object's status.
    pub status: Map<String, Value>,
    /// Registry to record originals in. Defaults to the registry of the
    /// `kapuchin_manager` object, then to the global one.
    pub registry: Option<&'a PatchRegistry>,
}

/// Printer object returned by a bootstrapped plugin's entry point.
#[derive(Debug)]
pub struct BootstrappedPlugin {
    module: &'static str,
    object: Arc<Instance>,
    patches_applied: usize,
    status: Map<String, Value>,
}

impl BootstrappedPlugin {
    pub fn module(&self) -> &'static str {
        self.module
    }

    /// The host object the plugin was bootstrapped against.
    pub fn object(&self) -> &Arc<Instance> {
        &self.object
    }

    pub fn patches_applied(&self) -> usize {
        self.patches_applied
    }
}

impl PrinterObject for BootstrappedPlugin {
    fn status(&self) -> Value {
        let mut status = Map::new();
        status.insert("enabled".into(), Value::Bool(true));
        for (key, value) in &self.status {
            status.insert(key.clone(), value.clone());
        }
        Value::Object(status)
    }
}

/// Patch the class of the live host object `host_object_name` with the
/// declarations of `module` that target it.
pub fn bootstrap(module: &PluginModule, config: &ConfigSection, host_object_name: &str) -> PluginResult<BootstrappedPlugin> {
    bootstrap_with(module, config, host_object_name, BootstrapOptions::default())
}

pub fn bootstrap_with(
    module: &PluginModule,
    config: &ConfigSection,
    host_object_name: &str,
    options: BootstrapOptions<'_>,
) -> PluginResult<BootstrappedPlugin> {
    let printer = config.printer()?;
    let object = printer
        .lookup_object(host_object_name)
        .ok_or_else(|| PluginSystemError::Discovery {
            name: host_object_name.to_string(),
            section: Some(config.name().to_string()),
            message: format!("no printer object named '{}' is registered", host_object_name),
        })?;
    let instance = object
        .as_any_arc()
        .downcast::<Instance>()
        .map_err(|_| PluginSystemError::NotPatchable {
            object: host_object_name.to_string(),
            message: "it is not an instance of a host class".to_string(),
        })?;

    let initialization = |source: HostError| PluginSystemError::Initialization {
        section: config.name().to_string(),
        source: Box::new(source),
    };

    if let Some(hook) = options.before_patch {
        hook(&instance).map_err(initialization)?;
    }

    let imported = module
        .import(&printer)
        .map_err(|e| PluginSystemError::import(config.name(), &module.path(), e))?;
    let class = instance.class().clone();
    // Record into the same registry the loader used, when there is one.
    let manager = printer.lookup::<KapuchinManager>(MANAGER_OBJECT);
    let registry = options
        .registry
        .or_else(|| manager.as_ref().map(|m| m.registry()))
        .unwrap_or_else(|| PatchRegistry::global());
    let warn_on_repatch = manager.as_ref().is_none_or(|m| m.settings().warn_on_repatch);
    let applier = PatchApplier::new(registry)
        .with_resolver(&*printer)
        .warn_on_repatch(warn_on_repatch);
    let applied = applier
        .apply_all(imported.declarations().iter().filter(|d| d.target().matches(&class)))
        .map_err(|source| PluginSystemError::Patch {
            section: config.name().to_string(),
            module: module.path(),
            source,
        })?;
    log::info!(
        "Bootstrapped '{}' against '{}' ({} patches on {})",
        module.path(),
        host_object_name,
        applied,
        class.name()
    );

    if let Some(hook) = options.after_patch {
        hook(&instance).map_err(initialization)?;
    }

    Ok(BootstrappedPlugin {
        module: module.name(),
        object: instance,
        patches_applied: applied,
        status: options.status,
    })
}

impl fmt::Debug for BootstrapOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapOptions")
            .field("before_patch", &self.before_patch.is_some())
            .field("after_patch", &self.after_patch.is_some())
            .field("status", &self.status)
            .finish()
    }
}
