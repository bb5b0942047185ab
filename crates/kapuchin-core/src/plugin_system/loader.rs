use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::host::config::ConfigFile;
use crate::host::error::HostError;
use crate::host::printer::{Printer, CONFIGFILE_OBJECT};
use crate::patching::applier::PatchApplier;
use crate::patching::registry::PatchRegistry;
use crate::plugin_system::descriptor::PluginDescriptor;
use crate::plugin_system::error::{PluginResult, PluginSystemError};
use crate::plugin_system::module::panic_message;

/// Outcome of [`PluginLoader::load_all`].
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Sections whose plugin loaded, in load order.
    pub loaded: Vec<String>,
    /// Failed plugins: section name (or plugin name when there is no
    /// section) and cause.
    pub failures: Vec<(String, PluginSystemError)>,
    /// Declarations newly applied across all plugins.
    pub patches_applied: usize,
}

impl LoadReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_sections(&self) -> Vec<&str> {
        self.failures.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// JSON summary used in printer status.
    pub fn status(&self) -> Value {
        let failed: Map<String, Value> = self
            .failures
            .iter()
            .map(|(name, error)| (name.clone(), Value::String(error.to_string())))
            .collect();
        json!({
            "loaded": self.loaded,
            "failed": failed,
            "patches_applied": self.patches_applied,
        })
    }
}

/// Loads resolved plugin descriptors into a printer.
pub struct PluginLoader<'a> {
    printer: &'a Arc<Printer>,
    registry: &'a PatchRegistry,
    strict: bool,
    warn_on_repatch: bool,
}

impl<'a> PluginLoader<'a> {
    pub fn new(printer: &'a Arc<Printer>, registry: &'a PatchRegistry) -> Self {
        Self {
            printer,
            registry,
            strict: false,
            warn_on_repatch: true,
        }
    }

    /// In strict mode the first failure aborts loading.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn warn_on_repatch(mut self, warn: bool) -> Self {
        self.warn_on_repatch = warn;
        self
    }

    /// Load every descriptor in order.
    ///
    /// A failing plugin is logged and its section acknowledged so host
    /// validation tolerates it; later plugins still load. In strict mode the
    /// first failure is returned instead.
    pub fn load_all<I>(&self, descriptors: I) -> PluginResult<LoadReport>
    where
        I: IntoIterator<Item = PluginResult<PluginDescriptor>>,
    {
        let mut report = LoadReport::default();
        for descriptor in descriptors {
            let outcome = descriptor.and_then(|d| self.load(&d).map(|applied| (d, applied)));
            match outcome {
                Ok((descriptor, applied)) => {
                    log::info!("Loaded plugin '{}' for [{}]", descriptor.module_path, descriptor.section_name());
                    report.loaded.push(descriptor.section_name().to_string());
                    report.patches_applied += applied;
                }
                Err(error) if self.strict => {
                    log::error!("Plugin loading aborted: {}", error);
                    return Err(error);
                }
                Err(error) => {
                    log::error!("Plugin failed to load, continuing without it: {}", error);
                    let name = match error.section() {
                        Some(section) => {
                            self.acknowledge(section);
                            section.to_string()
                        }
                        None => failure_name(&error),
                    };
                    report.failures.push((name, error));
                }
            }
        }
        Ok(report)
    }

    /// Load one plugin: check its entry point, import it, apply its
    /// declarations, run the entry point and register the returned object
    /// under the section name. Returns the number of patches applied.
    pub fn load(&self, descriptor: &PluginDescriptor) -> PluginResult<usize> {
        let section = descriptor.section_name();
        let module = &descriptor.module;

        let init = match (module.load_config(), module.load_config_prefix()) {
            (Some(_), Some(_)) => {
                return Err(PluginSystemError::AmbiguousEntryPoint {
                    section: section.to_string(),
                    module: descriptor.module_path.clone(),
                });
            }
            _ => descriptor.form.select(module).ok_or_else(|| PluginSystemError::MissingEntryPoint {
                section: section.to_string(),
                module: descriptor.module_path.clone(),
                expected: descriptor.form.entry_point(),
            })?,
        };

        let imported = module
            .import(self.printer)
            .map_err(|e| PluginSystemError::import(section, &descriptor.module_path, e))?;

        let applier = PatchApplier::new(self.registry)
            .with_resolver(&**self.printer)
            .warn_on_repatch(self.warn_on_repatch);
        let applied = applier
            .apply_all(imported.declarations())
            .map_err(|source| PluginSystemError::Patch {
                section: section.to_string(),
                module: descriptor.module_path.clone(),
                source,
            })?;
        log::debug!("Applied {} patches from '{}'", applied, descriptor.module_path);

        let object = match panic::catch_unwind(AssertUnwindSafe(|| init(&descriptor.section))) {
            Ok(result) => result,
            Err(payload) => Err(HostError::Other(format!("panic: {}", panic_message(payload.as_ref())))),
        }
        .map_err(|e| PluginSystemError::Initialization {
            section: section.to_string(),
            source: Box::new(e),
        })?;

        self.printer
            .add_object(section, object)
            .map_err(|e| PluginSystemError::Registration {
                section: section.to_string(),
                source: Box::new(e),
            })?;
        Ok(applied)
    }

    fn acknowledge(&self, section: &str) {
        match self.printer.lookup::<ConfigFile>(CONFIGFILE_OBJECT) {
            Some(config) => config.acknowledge_section(section),
            None => log::warn!("No config file registered; cannot acknowledge [{}]", section),
        }
    }
}

impl fmt::Debug for PluginLoader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginLoader")
            .field("strict", &self.strict)
            .field("warn_on_repatch", &self.warn_on_repatch)
            .finish()
    }
}

fn failure_name(error: &PluginSystemError) -> String {
    match error {
        PluginSystemError::Discovery { name, .. } | PluginSystemError::NotPatchable { object: name, .. } => {
            name.clone()
        }
        _ => "<plugins>".to_string(),
    }
}
