//! # Kapuchin Patching
//!
//! Replaces attributes of host classes at startup and keeps the values they
//! replaced so replacements can still reach them.
//!
//! - **[`declaration`]**: builders plugins use to describe replacements.
//! - **[`applier`]**: installs declarations on live classes.
//! - **[`registry`]**: the table of originals, keyed by class and attribute.
//! - [`call_original`]: invokes the pre-patch implementation.
pub mod applier;
pub mod declaration;
pub mod error;
pub mod registry;

use serde_json::Value;

use crate::host::class::HostClass;
use crate::host::error::HostResult;
use crate::host::instance::Instance;

pub use applier::{ApplyOutcome, ClassResolver, PatchApplier};
pub use declaration::{
    patch, patches, patches_named, DeclarationId, ModuleScope, PatchBuilder, PatchBundle, PatchDeclaration, PatchTarget,
};
pub use error::{PatchError, PatchResult};
pub use registry::{AppliedPatch, AttributeSnapshot, PatchRegistry, TargetKey};

/// Invoke the original `class.attribute` recorded in the global registry,
/// bound to `instance`.
///
/// Fails with [`PatchError::OriginalNotFound`] if the attribute was never
/// patched and with [`PatchError::NoOriginalValue`] if the patch created it.
pub fn call_original(class: &HostClass, attribute: &str, instance: &Instance, args: &[Value]) -> HostResult<Value> {
    PatchRegistry::global().call_original(class, attribute, instance, args)
}
