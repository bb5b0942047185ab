//! The `[kapuchin]` host extra.
//!
//! Adding `[kapuchin]` to `printer.cfg` activates the framework. Its entry
//! point does not load any plugin itself: it patches
//! `PrinterConfig.check_unused_options`, which the host calls once every
//! section has been read. The replacement loads the plugins first and then
//! runs the original validation, so plugin objects exist by the time the
//! host checks for unused sections.
use std::sync::{Arc, Weak};

use serde_json::{json, Value};

use crate::host::class::HostClass;
use crate::host::config::{ConfigFile, ConfigSection, CHECK_UNUSED_OPTIONS, PRINTER_CONFIG_CLASS};
use crate::host::error::{HostError, HostResult};
use crate::host::instance::Instance;
use crate::host::printer::{Printer, PrinterObject, CONFIGFILE_OBJECT};
use crate::kernel::constants::{KAPUCHIN_SECTION, MANAGER_OBJECT};
use crate::kernel::settings::KapuchinSettings;
use crate::patching::applier::{ApplyOutcome, PatchApplier};
use crate::patching::declaration::patch;
use crate::patching::registry::{PatchRegistry, TargetKey};
use crate::plugin_system::error::{PluginResult, PluginSystemError};
use crate::plugin_system::manager::KapuchinManager;
use crate::plugin_system::module::ModuleCatalog;

/// Register the `[kapuchin]` extra (both forms) on a printer.
pub fn register(printer: &Printer) {
    printer.register_extra(KAPUCHIN_SECTION, load_config);
    printer.register_extra_prefix(KAPUCHIN_SECTION, load_config_prefix);
}

/// Status object registered for the `[kapuchin]` section.
#[derive(Debug)]
pub struct KapuchinSentinel {
    printer: Weak<Printer>,
    settings: KapuchinSettings,
}

impl KapuchinSentinel {
    pub fn settings(&self) -> &KapuchinSettings {
        &self.settings
    }
}

impl PrinterObject for KapuchinSentinel {
    fn status(&self) -> Value {
        let patches_loaded = self
            .printer
            .upgrade()
            .and_then(|printer| printer.lookup::<KapuchinManager>(MANAGER_OBJECT))
            .is_some_and(|manager| manager.is_loaded());
        json!({
            "installed": true,
            "patches_loaded": patches_loaded,
            "settings": self.settings,
        })
    }
}

pub fn load_config(section: &ConfigSection) -> HostResult<Arc<dyn PrinterObject>> {
    let printer = section.printer()?;
    let settings = KapuchinSettings::from_section(section)?;
    let registry = active_registry(&printer);
    if install(&printer, registry, section.name())? {
        log::info!("Kapuchin installed on {}.{}", PRINTER_CONFIG_CLASS, CHECK_UNUSED_OPTIONS);
    }
    Ok(Arc::new(KapuchinSentinel {
        printer: Arc::downgrade(&printer),
        settings,
    }))
}

pub fn load_config_prefix(section: &ConfigSection) -> HostResult<Arc<dyn PrinterObject>> {
    load_config(section)
}

/// The registry patches on `printer` are recorded in: the one of its
/// `kapuchin_manager` when present, otherwise the global one. Replacements
/// use it to reach their originals.
pub fn active_registry(printer: &Printer) -> &'static PatchRegistry {
    printer
        .lookup::<KapuchinManager>(MANAGER_OBJECT)
        .map(|manager| manager.registry())
        .unwrap_or_else(PatchRegistry::global)
}

/// Patch the printer's `PrinterConfig.check_unused_options` so plugins load
/// before validation. `section` names the activating section (`kapuchin` or
/// `kapuchin <sub>`); the manager reads its settings from it. Returns `false`
/// when the hook was already installed.
pub fn install(printer: &Arc<Printer>, registry: &'static PatchRegistry, section: &str) -> HostResult<bool> {
    let class = printer.class(PRINTER_CONFIG_CLASS)?;
    if is_installed(&class, registry) {
        log::debug!("Kapuchin hook already installed; skipping");
        return Ok(false);
    }

    let target = Arc::downgrade(&class);
    let section = section.to_string();
    let declaration = patch(&class)
        .name(CHECK_UNUSED_OPTIONS)
        .extends_original()
        .with(move |this: &Instance, args: &[Value]| {
            load_plugins_for(this, registry, &section)?;
            let class = target.upgrade().ok_or(HostError::PrinterGone)?;
            registry.call_original(&class, CHECK_UNUSED_OPTIONS, this, args)
        })?
        .with_origin(KAPUCHIN_SECTION);

    let outcome = PatchApplier::new(registry).with_resolver(&**printer).apply(&declaration)?;
    Ok(matches!(outcome, ApplyOutcome::Applied(_)))
}

/// Look up or create the manager and run its load.
fn load_plugins_for(this: &Instance, registry: &'static PatchRegistry, section: &str) -> HostResult<()> {
    let printer = this.printer()?;
    let config = printer.require::<ConfigFile>(CONFIGFILE_OBJECT)?;
    let section = config.section(&printer, section)?;

    let manager = match printer.lookup::<KapuchinManager>(MANAGER_OBJECT) {
        Some(manager) => manager,
        None => {
            let settings = KapuchinSettings::from_section(&section)?;
            let manager = Arc::new(KapuchinManager::new(settings, ModuleCatalog::from_inventory()).with_registry(registry));
            printer.add_object(MANAGER_OBJECT, manager.clone())?;
            manager
        }
    };
    manager.load_plugins(&section)?;
    Ok(())
}

/// The manager of an activated printer.
pub fn manager(printer: &Printer) -> PluginResult<Arc<KapuchinManager>> {
    printer.lookup::<KapuchinManager>(MANAGER_OBJECT).ok_or_else(|| {
        PluginSystemError::NotActivated(format!("no '{}' object; add a [{}] section", MANAGER_OBJECT, KAPUCHIN_SECTION))
    })
}

/// Whether a class has the kapuchin hook installed in `registry`.
pub fn is_installed(class: &HostClass, registry: &PatchRegistry) -> bool {
    registry.is_patched(&TargetKey::new(class, CHECK_UNUSED_OPTIONS))
}
