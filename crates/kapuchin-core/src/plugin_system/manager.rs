use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::host::config::ConfigSection;
use crate::host::printer::PrinterObject;
use crate::kernel::settings::KapuchinSettings;
use crate::patching::registry::PatchRegistry;
use crate::plugin_system::descriptor::resolve;
use crate::plugin_system::error::PluginResult;
use crate::plugin_system::loader::{LoadReport, PluginLoader};
use crate::plugin_system::module::ModuleCatalog;

/// Printer object that runs plugin loading for one configuration read.
///
/// Registered as `kapuchin_manager` by the `[kapuchin]` hook the first time
/// the host validates its config.
pub struct KapuchinManager {
    registry: &'static PatchRegistry,
    catalog: ModuleCatalog,
    settings: KapuchinSettings,
    loaded: AtomicBool,
    report: Mutex<Option<LoadReport>>,
}

impl KapuchinManager {
    /// A manager recording into the global patch registry.
    pub fn new(settings: KapuchinSettings, catalog: ModuleCatalog) -> Self {
        Self {
            registry: PatchRegistry::global(),
            catalog,
            settings,
            loaded: AtomicBool::new(false),
            report: Mutex::new(None),
        }
    }

    pub fn with_registry(mut self, registry: &'static PatchRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &'static PatchRegistry {
        self.registry
    }

    pub fn settings(&self) -> &KapuchinSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    /// Whether [`KapuchinManager::load_plugins`] has run.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Resolve and load every plugin section of the config `config` belongs
    /// to. Runs at most once; later calls return immediately.
    ///
    /// In strict mode the first plugin failure is returned. The registry is
    /// frozen afterwards when `freeze_registry` is set, whatever the outcome.
    pub fn load_plugins(&self, config: &ConfigSection) -> PluginResult<()> {
        if self.loaded.swap(true, Ordering::SeqCst) {
            log::debug!("Plugins already loaded; skipping");
            return Ok(());
        }
        let printer = config.printer()?;

        let descriptors = resolve(config, &self.catalog, &self.settings);
        log::info!("Loading {} plugin section(s)", descriptors.len());
        let outcome = PluginLoader::new(&printer, self.registry)
            .strict(self.settings.strict)
            .warn_on_repatch(self.settings.warn_on_repatch)
            .load_all(descriptors);

        if self.settings.freeze_registry {
            self.registry.freeze();
        }

        let report = outcome?;
        if !report.is_success() {
            log::warn!("{} plugin(s) failed to load: {:?}", report.failures.len(), report.failed_sections());
        }
        *self.report.lock() = Some(report);
        Ok(())
    }


    /// Sections whose plugin loaded.
    pub fn loaded_sections(&self) -> Vec<String> {
        self.report.lock().as_ref().map(|r| r.loaded.clone()).unwrap_or_default()
    }

    /// Failed sections and the error text for each.
    pub fn failures(&self) -> Vec<(String, String)> {
        self.report.lock()
            .as_ref()
            .map(|r| r.failures.iter().map(|(name, e)| (name.clone(), e.to_string())).collect())
            .unwrap_or_default()
    }
}

impl PrinterObject for KapuchinManager {
    fn status(&self) -> Value {
        let report = match self.report.lock().as_ref() {
            Some(report) => report.status(),
            None => LoadReport::default().status(),
        };
        let patched: Vec<String> = self.registry.keys().iter().map(ToString::to_string).collect();
        let mut status = json!({
            "patches_loaded": self.is_loaded(),
            "registry": {
                "patched": patched,
                "frozen": self.registry.is_frozen(),
            },
        });
        if let (Some(status), Value::Object(report)) = (status.as_object_mut(), report) {
            status.extend(report);
        }
        status
    }
}

impl fmt::Debug for KapuchinManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KapuchinManager")
            .field("settings", &self.settings)
            .field("catalog", &self.catalog.paths())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
