//! # Patch Declarations
//!
//! Plugins describe the attributes they replace with declarations. Building a
//! declaration has no effect on the host; the [`PatchApplier`](super::PatchApplier)
//! installs it later.
//!
//! Two forms are offered:
//!
//! * single attribute: `patch(&class).name("attr").with(replacement)`
//! * bundle: `patches(&class).member(a).member_named("b", b).build()`
//!
//! Without an explicit name the attribute name is taken from the replacement
//! function item, so `fn cmd_RESET_VELOCITY_LIMIT(..)` patches
//! `cmd_RESET_VELOCITY_LIMIT`. Closures carry no usable name and must be
//! named explicitly.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::host::class::{HostClass, Method};
use crate::host::error::HostResult;
use crate::host::instance::Instance;
use crate::host::printer::Printer;
use crate::patching::applier::ClassResolver;
use crate::patching::error::{PatchError, PatchResult};

static NEXT_DECLARATION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclarationId(u64);

impl DeclarationId {
    fn next() -> Self {
        Self(NEXT_DECLARATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeclarationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decl-{}", self.0)
    }
}

/// The class a declaration patches.
#[derive(Debug, Clone)]
pub enum PatchTarget {
    Class(Arc<HostClass>),
    /// Resolved through a [`ClassResolver`] when the declaration is applied.
    Named(String),
}

impl PatchTarget {
    pub fn class_name(&self) -> &str {
        match self {
            PatchTarget::Class(class) => class.name(),
            PatchTarget::Named(name) => name,
        }
    }

    pub fn resolve(&self, resolver: Option<&dyn ClassResolver>) -> PatchResult<Arc<HostClass>> {
        match self {
            PatchTarget::Class(class) => Ok(class.clone()),
            PatchTarget::Named(name) => resolver
                .and_then(|r| r.resolve_class(name))
                .ok_or_else(|| PatchError::UnknownClass(name.clone())),
        }
    }

    /// Whether this target denotes `class`. Named targets match by name.
    pub fn matches(&self, class: &HostClass) -> bool {
        match self {
            PatchTarget::Class(target) => target.id() == class.id(),
            PatchTarget::Named(name) => name == class.name(),
        }
    }
}

/// One attribute replacement, not yet applied.
#[derive(Debug, Clone)]
pub struct PatchDeclaration {
    id: DeclarationId,
    target: PatchTarget,
    attribute: String,
    replacement: Method,
    extends_original: bool,
    origin: Option<String>,
}

impl PatchDeclaration {
    pub fn id(&self) -> DeclarationId {
        self.id
    }

    pub fn target(&self) -> &PatchTarget {
        &self.target
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn replacement(&self) -> &Method {
        &self.replacement
    }

    /// The replacement calls the original, so the attribute must exist.
    pub fn extends_original(&self) -> bool {
        self.extends_original
    }

    /// Module that declared this patch, if it was declared inside a module body.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

impl fmt::Display for PatchDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.target.class_name(), self.attribute)?;
        if let Some(origin) = &self.origin {
            write!(f, " from '{}'", origin)?;
        }
        Ok(())
    }
}

/// Attribute name derived from a replacement's type, or `None` for closures.
fn name_from_identity<F>() -> Option<String> {
    let type_name = std::any::type_name::<F>();
    // Closures and fn pointers have no item path to name the attribute after.
    if type_name.contains("{{closure}}") || type_name.starts_with("fn(") {
        return None;
    }
    let path = strip_generics(type_name);
    path.rsplit("::").next().filter(|name| !name.is_empty()).map(str::to_string)
}

/// `a::Wrap<u8>::scale` -> `a::Wrap::scale`.
fn strip_generics(path: &str) -> String {
    let mut depth = 0usize;
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn resolve_name<F>(explicit: Option<String>, target: &PatchTarget) -> PatchResult<String> {
    match explicit {
        Some(name) => Ok(name),
        None => name_from_identity::<F>().ok_or_else(|| PatchError::UnnamedReplacement {
                class: target.class_name().to_string(),
                type_name: std::any::type_name::<F>().to_string(),
            }),
    }
}

/// Builder for a single-attribute declaration. See [`patch`].
#[must_use]
#[derive(Debug)]
pub struct PatchBuilder {
    target: PatchTarget,
    name: Option<String>,
    extends_original: bool,
}

impl PatchBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn extends_original(mut self) -> Self {
        self.extends_original = true;
        self
    }

    /// Finish the declaration. Without [`PatchBuilder::name`] the attribute
    /// is the last path segment of the function item's type name.
    ///
    /// Derived names are best-effort: `std::any::type_name` output is not
    /// guaranteed stable across compiler versions. Prefer an explicit name
    /// for anything beyond a plain free function.
    pub fn with<F>(self, replacement: F) -> PatchResult<PatchDeclaration>
    where
        F: Fn(&Instance, &[Value]) -> HostResult<Value> + Send + Sync + 'static,
    {
        let attribute = resolve_name::<F>(self.name, &self.target)?;
        Ok(PatchDeclaration {
            id: DeclarationId::next(),
            target: self.target,
            attribute,
            replacement: Method::new(replacement),
            extends_original: self.extends_original,
            origin: None,
        })
    }
}

/// Start a single-attribute declaration against `class`.
pub fn patch(class: &Arc<HostClass>) -> PatchBuilder {
    PatchBuilder {
        target: PatchTarget::Class(class.clone()),
        name: None,
        extends_original: false,
    }
}

/// Builder for a group of declarations on one class. See [`patches`].
#[must_use]
#[derive(Debug)]
pub struct PatchBundle {
    target: PatchTarget,
    members: Vec<(String, Method, bool)>,
    error: Option<PatchError>,
}

impl PatchBundle {
    fn push<F>(mut self, name: Option<&str>, replacement: F, extends_original: bool) -> Self
    where
        F: Fn(&Instance, &[Value]) -> HostResult<Value> + Send + Sync + 'static,
    {
        if self.error.is_some() {
            return self;
        }
        match resolve_name::<F>(name.map(str::to_string), &self.target) {
            Ok(attribute) => self.members.push((attribute, Method::new(replacement), extends_original)),
            Err(e) => self.error = Some(e),
        }
        self
    }

    /// Add a member named after the function item.
    ///
    /// The name comes from `std::any::type_name`, which is not guaranteed
    /// stable; [`PatchBundle::member_named`] is the reliable form.
    pub fn member<F>(self, replacement: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> HostResult<Value> + Send + Sync + 'static,
    {
        self.push(None, replacement, false)
    }

    pub fn member_named<F>(self, name: &str, replacement: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> HostResult<Value> + Send + Sync + 'static,
    {
        self.push(Some(name), replacement, false)
    }

    /// Add a member that calls the original of `name`.
    pub fn extending<F>(self, name: &str, replacement: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> HostResult<Value> + Send + Sync + 'static,
    {
        self.push(Some(name), replacement, true)
    }

    /// One declaration per member, in member order. The first naming error
    /// wins.
    pub fn build(self) -> PatchResult<Vec<PatchDeclaration>> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let target = self.target;
        Ok(self
            .members
            .into_iter()
            .map(|(attribute, replacement, extends_original)| PatchDeclaration {
                id: DeclarationId::next(),
                target: target.clone(),
                attribute,
                replacement,
                extends_original,
                origin: None,
            })
            .collect())
    }
}

/// Start a bundle against `class`.
pub fn patches(class: &Arc<HostClass>) -> PatchBundle {
    PatchBundle {
        target: PatchTarget::Class(class.clone()),
        members: Vec::new(),
        error: None,
    }
}

/// Start a bundle against a class known only by name. The name is resolved
/// when the declarations are applied.
pub fn patches_named(class_name: &str) -> PatchBundle {
    PatchBundle {
        target: PatchTarget::Named(class_name.to_string()),
        members: Vec::new(),
        error: None,
    }
}

/// Context handed to a plugin module's import function.
///
/// Everything declared here is collected, tagged with the module name and
/// returned to the loader once the import finishes.
pub struct ModuleScope<'a> {
    printer: &'a Arc<Printer>,
    module: &'static str,
    declarations: Vec<PatchDeclaration>,
}

impl<'a> ModuleScope<'a> {
    pub fn new(printer: &'a Arc<Printer>, module: &'static str) -> Self {
        Self {
            printer,
            module,
            declarations: Vec::new(),
        }
    }

    pub fn module(&self) -> &'static str {
        self.module
    }

    pub fn printer(&self) -> &Arc<Printer> {
        self.printer
    }

    /// Look up a host class, as a module body would import it.
    pub fn class(&self, name: &str) -> HostResult<Arc<HostClass>> {
        self.printer.class(name)
    }

    pub fn declare(&mut self, declaration: PatchDeclaration) -> &mut Self {
        self.declarations.push(declaration.with_origin(self.module));
        self
    }

    pub fn declare_all(&mut self, declarations: impl IntoIterator<Item = PatchDeclaration>) -> &mut Self {
        for declaration in declarations {
            self.declare(declaration);
        }
        self
    }

    pub fn declarations(&self) -> &[PatchDeclaration] {
        &self.declarations
    }

    pub fn into_declarations(self) -> Vec<PatchDeclaration> {
        self.declarations
    }
}

impl fmt::Debug for ModuleScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleScope")
            .field("module", &self.module)
            .field("declarations", &self.declarations.len())
            .finish()
    }
}
