use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde_json::Value;

use crate::host::class::{ClassId, HostClass, Method};
use crate::host::error::HostResult;
use crate::host::instance::Instance;
use crate::patching::declaration::DeclarationId;
use crate::patching::error::{PatchError, PatchResult};

/// Identifies a patch point: a host class and one attribute name on it.
///
/// Equality and hashing use the class identity and the attribute only; the
/// class name is kept for messages.
#[derive(Clone)]
pub struct TargetKey {
    class_id: ClassId,
    class_name: Arc<str>,
    attribute: String,
}

impl TargetKey {
    pub fn new(class: &HostClass, attribute: &str) -> Self {
        Self {
            class_id: class.id(),
            class_name: Arc::from(class.name()),
            attribute: attribute.to_string(),
        }
    }

    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub(crate) fn not_found(&self) -> PatchError {
        PatchError::OriginalNotFound {
            class: self.class_name.to_string(),
            attribute: self.attribute.clone(),
        }
    }

    pub(crate) fn no_original(&self) -> PatchError {
        PatchError::NoOriginalValue {
            class: self.class_name.to_string(),
            attribute: self.attribute.clone(),
        }
    }

    fn frozen(&self) -> PatchError {
        PatchError::RegistryFrozen {
            class: self.class_name.to_string(),
            attribute: self.attribute.clone(),
        }
    }
}

impl PartialEq for TargetKey {
    fn eq(&self, other: &Self) -> bool {
        self.class_id == other.class_id && self.attribute == other.attribute
    }
}

impl Eq for TargetKey {}

impl Hash for TargetKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.class_id.hash(state);
        self.attribute.hash(state);
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class_name, self.attribute)
    }
}

impl fmt::Debug for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TargetKey({}{}.{})", self.class_name, self.class_id, self.attribute)
    }
}

/// The value an attribute had immediately before the first patch for its key.
/// `None` when the patch created the attribute.
#[derive(Debug)]
pub struct AttributeSnapshot {
    key: TargetKey,
    value: Option<Method>,
}

impl AttributeSnapshot {
    pub fn key(&self) -> &TargetKey {
        &self.key
    }

    pub fn value(&self) -> Option<&Method> {
        self.value.as_ref()
    }

    /// Whether the attribute existed before it was patched.
    pub fn existed(&self) -> bool {
        self.value.is_some()
    }

    /// The original callable, or [`PatchError::NoOriginalValue`].
    pub fn original(&self) -> PatchResult<&Method> {
        self.value.as_ref().ok_or_else(|| self.key.no_original())
    }
}

/// The replacement currently installed for a key.
#[derive(Debug, Clone)]
pub struct AppliedPatch {
    pub declaration: DeclarationId,
    pub origin: Option<String>,
    pub replacement: Method,
}

/// Process-wide table of patched attributes.
///
/// Written during the startup load phase only. Once [`PatchRegistry::freeze`]
/// has run, recording a new key fails and lookups keep working.
#[derive(Default)]
pub struct PatchRegistry {
    snapshots: RwLock<HashMap<TargetKey, Arc<AttributeSnapshot>>>,
    current: RwLock<HashMap<TargetKey, AppliedPatch>>,
    applied: RwLock<HashSet<DeclarationId>>,
    frozen: AtomicBool,
}

static GLOBAL_REGISTRY: OnceLock<PatchRegistry> = OnceLock::new();

impl PatchRegistry {
    /// Create an empty registry, separate from the global one.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry used by [`call_original`](crate::patching::call_original)
    /// and by the `[kapuchin]` extra.
    pub fn global() -> &'static PatchRegistry {
        GLOBAL_REGISTRY.get_or_init(PatchRegistry::new)
    }

    /// Store a snapshot for `key` unless one exists. Returns the stored
    /// snapshot, which is always the first value ever recorded for the key.
    pub fn record_if_absent(&self, key: TargetKey, current: Option<Method>) -> PatchResult<Arc<AttributeSnapshot>> {
        let mut snapshots = self.snapshots.write();
        if let Some(existing) = snapshots.get(&key) {
            return Ok(existing.clone());
        }
        if self.is_frozen() {
            return Err(key.frozen());
        }
        log::debug!("Recording original of {} (existed: {})", key, current.is_some());
        let snapshot = Arc::new(AttributeSnapshot { key: key.clone(), value: current });
        snapshots.insert(key, snapshot.clone());
        Ok(snapshot)
    }

    /// The snapshot for `key`, or [`PatchError::OriginalNotFound`].
    pub fn lookup(&self, key: &TargetKey) -> PatchResult<Arc<AttributeSnapshot>> {
        self.snapshots.read().get(key).cloned().ok_or_else(|| key.not_found())
    }

    pub fn is_patched(&self, key: &TargetKey) -> bool {
        self.snapshots.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every patched key, sorted by `Class.attribute`.
    pub fn keys(&self) -> Vec<TargetKey> {
        let mut keys: Vec<TargetKey> = self.snapshots.read().keys().cloned().collect();
        keys.sort_by_key(|k| k.to_string());
        keys
    }

    /// Record `patch` as the live replacement for `key`, returning the one it
    /// superseded.
    pub fn record_applied(&self, key: &TargetKey, patch: AppliedPatch) -> PatchResult<Option<AppliedPatch>> {
        if self.is_frozen() {
            return Err(key.frozen());
        }
        self.mark_applied(patch.declaration);
        Ok(self.current.write().insert(key.clone(), patch))
    }

    pub fn mark_applied(&self, declaration: DeclarationId) {
        self.applied.write().insert(declaration);
    }

    /// The replacement most recently applied for `key`.
    pub fn current(&self, key: &TargetKey) -> Option<AppliedPatch> {
        self.current.read().get(key).cloned()
    }

    pub fn is_applied(&self, declaration: DeclarationId) -> bool {
        self.applied.read().contains(&declaration)
    }

    /// End the write phase.
    pub fn freeze(&self) {
        if !self.frozen.swap(true, Ordering::SeqCst) {
            log::info!("Patch registry frozen with {} patched attributes", self.len());
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    /// The pre-patch implementation of `class.attribute`.
    pub fn original(&self, class: &HostClass, attribute: &str) -> PatchResult<Method> {
        let snapshot = self.lookup(&TargetKey::new(class, attribute))?;
        snapshot.original().cloned()
    }

    /// Invoke the pre-patch implementation of `class.attribute` bound to
    /// `instance`. Errors from the original are returned unchanged.
    pub fn call_original(&self, class: &HostClass, attribute: &str, instance: &Instance, args: &[Value]) -> HostResult<Value> {
        let original = self.original(class, attribute)?;
        original.call(instance, args)
    }
}

impl fmt::Debug for PatchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchRegistry")
            .field("keys", &self.keys())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
