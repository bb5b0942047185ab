use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::host::class::HostClass;
use crate::host::error::{HostError, HostResult};
use crate::host::printer::{Printer, PrinterObject};

/// An object of a [`HostClass`]. State is a JSON attribute map; behaviour is
/// whatever the class's method table holds when [`Instance::call`] runs.
pub struct Instance {
    class: Arc<HostClass>,
    printer: Weak<Printer>,
    this: Weak<Instance>,
    state: Mutex<Map<String, Value>>,
}

impl Instance {
    pub(crate) fn new(class: Arc<HostClass>, printer: Weak<Printer>, state: Map<String, Value>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            class,
            printer,
            this: this.clone(),
            state: Mutex::new(state),
        })
    }

    pub fn class(&self) -> &Arc<HostClass> {
        &self.class
    }

    /// The printer this instance was created for.
    pub fn printer(&self) -> HostResult<Arc<Printer>> {
        self.printer.upgrade().ok_or(HostError::PrinterGone)
    }

    /// A shared handle to this instance, for callbacks that outlive the call.
    pub fn handle(&self) -> HostResult<Arc<Instance>> {
        self.this
            .upgrade()
            .ok_or_else(|| HostError::Other(format!("instance of '{}' is being dropped", self.class.name())))
    }

    /// Call a method through the class's live method table.
    pub fn call(&self, name: &str, args: &[Value]) -> HostResult<Value> {
        // Resolve first so no lock is held while the method runs.
        let method = self.class.get_attribute(name).ok_or_else(|| self.class.missing(name))?;
        method.call(self, args)
    }


    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().contains_key(key)
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.state.lock().insert(key.to_string(), value.into());
    }

    /// Numeric attribute, failing like a missing attribute when absent.
    pub fn get_f64(&self, key: &str) -> HostResult<f64> {
        self.get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| self.class.missing(key))
    }

    pub fn get_f64_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    /// Copy of the full attribute map.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.state.lock().clone()
    }
}

impl PrinterObject for Instance {
    fn status(&self) -> Value {
        Value::Object(self.snapshot())
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class.name())
            .field("state", &*self.state.lock())
            .finish()
    }
}

/// Positional argument `index` of `method`, as a number.
pub fn arg_f64(args: &[Value], index: usize, method: &str) -> HostResult<f64> {
    args.get(index)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HostError::BadArgument { method: method.to_string(), index })
}

/// Positional argument `index` of `method`, as a JSON object.
pub fn arg_object<'a>(args: &'a [Value], index: usize, method: &str) -> HostResult<&'a Map<String, Value>> {
    args.get(index)
        .and_then(|v| v.as_object())
        .ok_or_else(|| HostError::BadArgument { method: method.to_string(), index })
}
