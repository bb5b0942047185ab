use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};

use crate::host::class::HostClass;
use crate::host::config::{self, ConfigFile, ConfigSection};
use crate::host::error::{HostError, HostResult};
use crate::host::gcode::GCodeDispatcher;
use crate::patching::applier::ClassResolver;

/// Name of the config object in the printer's object registry.
pub const CONFIGFILE_OBJECT: &str = "configfile";
/// Name of the G-code dispatcher in the printer's object registry.
pub const GCODE_OBJECT: &str = "gcode";

/// Upcast helper so `Arc<dyn PrinterObject>` can be downcast to its concrete type.
pub trait AsAny {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Anything that can be registered by name on the printer.
pub trait PrinterObject: AsAny + Send + Sync {
    /// Status reported to clients. Objects without status report `null`.
    fn status(&self) -> Value {
        Value::Null
    }
}

/// Initialization entry point of a host extra (and of a patch plugin).
pub type ExtraInit = fn(&ConfigSection) -> HostResult<Arc<dyn PrinterObject>>;

/// The host's module-import facility: imports run once per module path and
/// their result is cached. A failed import is not cached.
#[derive(Default)]
pub struct ModuleCache {
    modules: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl ModuleCache {
    fn cached(&self, path: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.modules.lock().get(path).cloned()
    }

    /// Return the cached module for `path`, running `import` on first use.
    pub fn get_or_import<F>(&self, path: &str, import: F) -> HostResult<Arc<dyn Any + Send + Sync>>
    where
        F: FnOnce() -> HostResult<Arc<dyn Any + Send + Sync>>,
    {
        if let Some(module) = self.cached(path) {
            return Ok(module);
        }
        // The import body runs without the cache lock held.
        let module = import()?;
        let mut modules = self.modules.lock();
        Ok(modules.entry(path.to_string()).or_insert(module).clone())
    }

    pub fn is_imported(&self, path: &str) -> bool {
        self.cached(path).is_some()
    }

    /// Paths of every imported module, sorted.
    pub fn imported(&self) -> Vec<String> {
        let modules = self.modules.lock();
        let mut paths: Vec<String> = modules.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[derive(Default)]
struct Extras {
    load_config: HashMap<String, ExtraInit>,
    load_config_prefix: HashMap<String, ExtraInit>,
}

/// The host process: named objects, host classes, extras and the module cache.
pub struct Printer {
    objects: RwLock<Vec<(String, Arc<dyn PrinterObject>)>>,
    classes: RwLock<HashMap<String, Arc<HostClass>>>,
    extras: RwLock<Extras>,
    modules: ModuleCache,
}

impl Printer {
    /// Create a printer with the host's built-in objects: the G-code
    /// dispatcher and the `PrinterConfig` class.
    pub fn new() -> Arc<Self> {
        let gcode: Arc<dyn PrinterObject> = Arc::new(GCodeDispatcher::new());
        let printer = Arc::new(Self {
            objects: RwLock::new(vec![(GCODE_OBJECT.to_string(), gcode)]),
            classes: RwLock::new(HashMap::new()),
            extras: RwLock::new(Extras::default()),
            modules: ModuleCache::default(),
        });
        printer.register_class(config::printer_config_class());
        printer
    }

    // --- Object registry ---

    /// Register an object by name. Names are unique.
    pub fn add_object(&self, name: &str, object: Arc<dyn PrinterObject>) -> HostResult<()> {
        let mut objects = self.objects.write();
        if objects.iter().any(|(existing, _)| existing == name) {
            return Err(HostError::DuplicateObject(name.to_string()));
        }
        log::debug!("Registered printer object '{}'", name);
        objects.push((name.to_string(), object));
        Ok(())
    }

    pub fn lookup_object(&self, name: &str) -> Option<Arc<dyn PrinterObject>> {
        let objects = self.objects.read();
        objects.iter().find(|(existing, _)| existing == name).map(|(_, obj)| obj.clone())
    }

    /// Look up an object and downcast it to its concrete type.
    pub fn lookup<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.lookup_object(name)
            .and_then(|obj| Arc::downcast::<T>(obj.as_any_arc()).ok())
    }

    /// Like [`Printer::lookup`], failing with [`HostError::ObjectNotFound`].
    pub fn require<T: Any + Send + Sync>(&self, name: &str) -> HostResult<Arc<T>> {
        self.lookup::<T>(name).ok_or_else(|| HostError::ObjectNotFound(name.to_string()))
    }

    /// Names of registered objects, in registration order.
    pub fn object_names(&self) -> Vec<String> {
        let objects = self.objects.read();
        objects.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Status of every object that reports one, keyed by object name.
    pub fn status(&self) -> Map<String, Value> {
        let objects = self.objects.read().clone();
        objects
            .into_iter()
            .map(|(name, obj)| (name, obj.status()))
            .filter(|(_, status)| !status.is_null())
            .collect()
    }

    pub fn gcode(&self) -> HostResult<Arc<GCodeDispatcher>> {
        self.require::<GCodeDispatcher>(GCODE_OBJECT)
    }

    // --- Class table ---

    pub fn register_class(&self, class: Arc<HostClass>) {
        let mut classes = self.classes.write();
        classes.insert(class.name().to_string(), class);
    }

    pub fn class(&self, name: &str) -> HostResult<Arc<HostClass>> {
        let classes = self.classes.read();
        classes.get(name).cloned().ok_or_else(|| HostError::ClassNotFound(name.to_string()))
    }

    // --- Extras ---

    /// Register the `load_config` entry point for sections named `name`.
    pub fn register_extra(&self, name: &str, init: ExtraInit) {
        let mut extras = self.extras.write();
        extras.load_config.insert(name.to_string(), init);
    }

    /// Register the `load_config_prefix` entry point for sections `name <sub>`.
    pub fn register_extra_prefix(&self, name: &str, init: ExtraInit) {
        let mut extras = self.extras.write();
        extras.load_config_prefix.insert(name.to_string(), init);
    }

    fn extra_for(&self, section_name: &str) -> Option<ExtraInit> {
        let extras = self.extras.read();
        let mut parts = section_name.split_whitespace();
        let base = parts.next()?;
        if parts.next().is_some() {
            extras.load_config_prefix.get(base).copied()
        } else {
            extras.load_config.get(base).copied()
        }
    }

    pub fn modules(&self) -> &ModuleCache {
        &self.modules
    }

    /// Run the host's configuration sequence: register the config object,
    /// load an object for every section with a known extra (in file order),
    /// then validate through the live `PrinterConfig.check_unused_options`.
    pub fn startup(self: &Arc<Self>, config: Arc<ConfigFile>) -> HostResult<()> {
        self.add_object(CONFIGFILE_OBJECT, config.clone())?;
        let printer_config = self.class(config::PRINTER_CONFIG_CLASS)?.instantiate(self, &[])?;

        for section in config.sections(self) {
            let Some(init) = self.extra_for(section.name()) else {
                continue;
            };
            log::debug!("Loading object for section '{}'", section.name());
            let object = init(&section)?;
            if self.lookup_object(section.name()).is_none() {
                self.add_object(section.name(), object)?;
            }
        }

        printer_config.call(config::CHECK_UNUSED_OPTIONS, &[])?;
        log::info!("Printer configured with {} objects", self.object_names().len());
        Ok(())
    }
}

impl ClassResolver for Printer {
    fn resolve_class(&self, name: &str) -> Option<Arc<HostClass>> {
        self.class(name).ok()
    }
}

impl fmt::Debug for Printer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Printer")
            .field("objects", &self.object_names())
            .field("modules", &self.modules.imported())
            .finish()
    }
}
