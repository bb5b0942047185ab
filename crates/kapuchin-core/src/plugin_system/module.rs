use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::host::error::{HostError, HostResult};
use crate::host::printer::{ExtraInit, Printer};
use crate::kernel::constants::MODULE_ROOT;
use crate::patching::declaration::{ModuleScope, PatchDeclaration};

/// Module body of a plugin: looks up host classes and declares patches.
pub type ImportFn = fn(&mut ModuleScope<'_>) -> HostResult<()>;

/// Plugin initialization entry point. Same shape as a host extra.
pub type InitFn = ExtraInit;

/// A statically linked plugin module.
///
/// Plugin crates build one with the `const` builders and submit it with
/// [`register_plugin_module!`](crate::register_plugin_module):
///
/// ```ignore
/// pub const MODULE: PluginModule = PluginModule::new("hello", import).with_load_config(load_config);
/// kapuchin_core::register_plugin_module!(MODULE);
/// ```
#[derive(Clone, Copy)]
pub struct PluginModule {
    name: &'static str,
    description: &'static str,
    import: ImportFn,
    load_config: Option<InitFn>,
    load_config_prefix: Option<InitFn>,
}

impl PluginModule {
    /// `name` is the plugin identifier used in `[patch <name>]`.
    pub const fn new(name: &'static str, import: ImportFn) -> Self {
        Self {
            name,
            description: "",
            import,
            load_config: None,
            load_config_prefix: None,
        }
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn with_load_config(mut self, init: InitFn) -> Self {
        self.load_config = Some(init);
        self
    }

    pub const fn with_load_config_prefix(mut self, init: InitFn) -> Self {
        self.load_config_prefix = Some(init);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Module path: `patches.<name>`.
    pub fn path(&self) -> String {
        module_path(self.name)
    }

    pub fn load_config(&self) -> Option<InitFn> {
        self.load_config
    }

    pub fn load_config_prefix(&self) -> Option<InitFn> {
        self.load_config_prefix
    }

    /// Run the module body and collect its declarations. Panics in the body
    /// are reported as errors.
    pub fn run_import(&self, printer: &Arc<Printer>) -> HostResult<ImportedModule> {
        let mut scope = ModuleScope::new(printer, self.name);
        let import = self.import;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| import(&mut scope)));
        match outcome {
            Ok(result) => result?,
            Err(payload) => return Err(HostError::Other(format!("panic: {}", panic_message(payload.as_ref())))),
        }
        Ok(ImportedModule {
            name: self.name,
            declarations: scope.into_declarations(),
        })
    }

    /// Import through the host's module cache, so the body runs once per
    /// module path and every caller sees the same declarations.
    pub fn import(&self, printer: &Arc<Printer>) -> HostResult<Arc<ImportedModule>> {
        let path = self.path();
        let module = printer
            .modules()
            .get_or_import(&path, || Ok(Arc::new(self.run_import(printer)?) as Arc<dyn Any + Send + Sync>))?;
        module
            .downcast::<ImportedModule>()
            .map_err(|_| HostError::Other(format!("module cache entry '{}' is not a plugin module", path)))
    }
}

impl fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginModule")
            .field("name", &self.name)
            .field("load_config", &self.load_config.is_some())
            .field("load_config_prefix", &self.load_config_prefix.is_some())
            .finish()
    }
}

inventory::collect!(PluginModule);

/// Submit a [`PluginModule`] constant to the process-wide module list.
#[macro_export]
macro_rules! register_plugin_module {
    ($module:expr) => {
        $crate::inventory::submit! { $module }
    };
}

/// The result of importing a plugin module.
#[derive(Debug)]
pub struct ImportedModule {
    name: &'static str,
    declarations: Vec<PatchDeclaration>,
}

impl ImportedModule {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn declarations(&self) -> &[PatchDeclaration] {
        &self.declarations
    }
}

/// Module path of a plugin identifier: `patches.<id>`.
pub fn module_path(plugin_id: &str) -> String {
    format!("{}.{}", MODULE_ROOT, plugin_id)
}

/// The importable plugin modules, by module path.
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    modules: BTreeMap<String, PluginModule>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every module submitted with `register_plugin_module!` in this binary.
    pub fn from_inventory() -> Self {
        let mut catalog = Self::new();
        for module in inventory::iter::<PluginModule> {
            catalog.register(*module);
        }
        catalog
    }

    /// Add a module. A module with the same name replaces the earlier one.
    pub fn register(&mut self, module: PluginModule) -> &mut Self {
        let path = module.path();
        if self.modules.insert(path.clone(), module).is_some() {
            log::warn!("Plugin module '{}' registered twice; keeping the last one", path);
        }
        self
    }

    pub fn find(&self, path: &str) -> Option<&PluginModule> {
        self.modules.get(path)
    }

    pub fn paths(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    pub fn modules(&self) -> impl Iterator<Item = (&str, &PluginModule)> {
        self.modules.iter().map(|(path, module)| (path.as_str(), module))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic reason".to_string()
    }
}
