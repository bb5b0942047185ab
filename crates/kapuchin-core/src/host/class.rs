use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::host::error::{HostError, HostResult};
use crate::host::instance::Instance;
use crate::host::printer::Printer;

/// Attribute name of the constructor run by [`HostClass::instantiate`].
pub const CONSTRUCTOR: &str = "__init__";

static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`HostClass`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u64);

impl ClassId {
    fn next() -> Self {
        ClassId(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Signature shared by every host method, original or replacement.
/// The instance is the bound receiver (`self`).
pub type MethodFn = dyn Fn(&Instance, &[Value]) -> HostResult<Value> + Send + Sync;

/// A callable attribute stored in a class's method table.
#[derive(Clone)]
pub struct Method(Arc<MethodFn>);

impl Method {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> HostResult<Value> + Send + Sync + 'static,
    {
        Method(Arc::new(f))
    }

    /// Invoke the method bound to `instance`.
    pub fn call(&self, instance: &Instance, args: &[Value]) -> HostResult<Value> {
        (self.0)(instance, args)
    }

    /// Whether both handles point at the same callable.
    pub fn ptr_eq(&self, other: &Method) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Method({:p})", Arc::as_ptr(&self.0))
    }
}

/// A host type: a name, an optional base class and a live method table.
///
/// Every call made through an [`Instance`] resolves its method here at call
/// time, so replacing an entry changes the behaviour of all existing and
/// future instances.
pub struct HostClass {
    id: ClassId,
    name: String,
    base: Option<Arc<HostClass>>,
    attributes: RwLock<HashMap<String, Method>>,
}

impl HostClass {
    /// Create a new class with an empty method table.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: ClassId::next(),
            name: name.into(),
            base: None,
            attributes: RwLock::new(HashMap::new()),
        })
    }

    /// Create a new class deriving from `base`.
    pub fn with_base(name: impl Into<String>, base: &Arc<HostClass>) -> Arc<Self> {
        Arc::new(Self {
            id: ClassId::next(),
            name: name.into(),
            base: Some(base.clone()),
            attributes: RwLock::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> Option<&Arc<HostClass>> {
        self.base.as_ref()
    }

    /// Define (or redefine) a method on this class. Returns `self` so class
    /// bodies can be written as a chain.
    pub fn define<F>(&self, name: &str, f: F) -> &Self
    where
        F: Fn(&Instance, &[Value]) -> HostResult<Value> + Send + Sync + 'static,
    {
        self.set_attribute(name, Method::new(f));
        self
    }

    /// Look up an attribute, walking the base chain.
    pub fn get_attribute(&self, name: &str) -> Option<Method> {
        if let Some(method) = self.own_attribute(name) {
            return Some(method);
        }
        self.base.as_ref().and_then(|base| base.get_attribute(name))
    }

    /// Look up an attribute defined on this class only.
    pub fn own_attribute(&self, name: &str) -> Option<Method> {
        self.attributes.read().get(name).cloned()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.get_attribute(name).is_some()
    }

    /// Overwrite an attribute on this class. Returns the previous own value.
    pub fn set_attribute(&self, name: &str, method: Method) -> Option<Method> {
        let mut attrs = self.attributes.write();
        attrs.insert(name.to_string(), method)
    }

    /// Names of the attributes defined on this class, sorted.
    pub fn attribute_names(&self) -> Vec<String> {
        let attrs = self.attributes.read();
        let mut names: Vec<String> = attrs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether this class is `other` or derives from it.
    pub fn is_subclass_of(&self, other: &HostClass) -> bool {
        if self.id == other.id {
            return true;
        }
        self.base.as_ref().is_some_and(|base| base.is_subclass_of(other))
    }

    /// Construct an instance and run its live constructor, if any.
    pub fn instantiate(self: &Arc<Self>, printer: &Arc<Printer>, args: &[Value]) -> HostResult<Arc<Instance>> {
        let instance = Instance::new(self.clone(), Arc::downgrade(printer), Map::new());
        if let Some(init) = self.get_attribute(CONSTRUCTOR) {
            init.call(&instance, args)?;
        }
        Ok(instance)
    }

    /// Construct an instance without a printer, for classes that never
    /// reach host objects.
    pub fn instantiate_detached(self: &Arc<Self>, args: &[Value]) -> HostResult<Arc<Instance>> {
        let instance = Instance::new(self.clone(), Weak::new(), Map::new());
        if let Some(init) = self.get_attribute(CONSTRUCTOR) {
            init.call(&instance, args)?;
        }
        Ok(instance)
    }

    pub(crate) fn missing(&self, attribute: &str) -> HostError {
        HostError::AttributeMissing {
            class: self.name.clone(),
            attribute: attribute.to_string(),
        }
    }
}

impl fmt::Debug for HostClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostClass")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("base", &self.base.as_ref().map(|b| b.name()))
            .finish()
    }
}
