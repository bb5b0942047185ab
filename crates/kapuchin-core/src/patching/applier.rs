use std::fmt;
use std::sync::Arc;

use crate::host::class::HostClass;
use crate::patching::declaration::PatchDeclaration;
use crate::patching::error::PatchResult;
use crate::patching::registry::{AppliedPatch, PatchRegistry, TargetKey};

/// Turns a class name into a live host class. Used for declarations made
/// with [`patches_named`](super::patches_named).
pub trait ClassResolver {
    fn resolve_class(&self, name: &str) -> Option<Arc<HostClass>>;
}

/// What [`PatchApplier::apply`] did with a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied(TargetKey),
    /// The declaration had been applied before; nothing changed.
    AlreadyApplied,
}

/// Installs declarations on host classes, recording originals in a registry.
pub struct PatchApplier<'a> {
    registry: &'a PatchRegistry,
    resolver: Option<&'a dyn ClassResolver>,
    warn_on_repatch: bool,
}

impl<'a> PatchApplier<'a> {
    pub fn new(registry: &'a PatchRegistry) -> Self {
        Self {
            registry,
            resolver: None,
            warn_on_repatch: true,
        }
    }

    pub fn with_resolver(mut self, resolver: &'a dyn ClassResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn warn_on_repatch(mut self, warn: bool) -> Self {
        self.warn_on_repatch = warn;
        self
    }

    pub fn registry(&self) -> &'a PatchRegistry {
        self.registry
    }

    /// Apply one declaration.
    ///
    /// The first value ever seen for a key is kept as its original. A second
    /// declaration for an already patched key replaces the live attribute
    /// (last applied wins) and logs a warning.
    pub fn apply(&self, declaration: &PatchDeclaration) -> PatchResult<ApplyOutcome> {
        if self.registry.is_applied(declaration.id()) {
            log::debug!("Skipping {} ({}): already applied", declaration, declaration.id());
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        let class = declaration.target().resolve(self.resolver)?;
        let key = TargetKey::new(&class, declaration.attribute());
        let current = class.get_attribute(declaration.attribute());

        if declaration.extends_original() && current.is_none() {
            return Err(key.no_original());
        }

        self.registry.record_if_absent(key.clone(), current)?;
        let previous = self.registry.record_applied(
            &key,
            AppliedPatch {
                declaration: declaration.id(),
                origin: declaration.origin().map(str::to_string),
                replacement: declaration.replacement().clone(),
            },
        )?;

        if let Some(previous) = previous.filter(|_| self.warn_on_repatch) {
            log::warn!(
                "'{}' patched twice: '{}' replaces the patch from '{}'; the first original is kept",
                key,
                declaration.origin().unwrap_or("<unknown>"),
                previous.origin.as_deref().unwrap_or("<unknown>"),
            );
        }

        class.set_attribute(declaration.attribute(), declaration.replacement().clone());
        log::debug!("Applied patch {}", declaration);
        Ok(ApplyOutcome::Applied(key))
    }

    /// Apply declarations in order, stopping at the first failure. Returns how
    /// many were newly applied.
    pub fn apply_all<'d, I>(&self, declarations: I) -> PatchResult<usize>
    where
        I: IntoIterator<Item = &'d PatchDeclaration>,
    {
        let mut applied = 0;
        for declaration in declarations {
            if let ApplyOutcome::Applied(_) = self.apply(declaration)? {
                applied += 1;
            }
        }
        Ok(applied)
    }
}

impl fmt::Debug for PatchApplier<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchApplier")
            .field("registry", &self.registry)
            .field("has_resolver", &self.resolver.is_some())
            .field("warn_on_repatch", &self.warn_on_repatch)
            .finish()
    }
}
