//! # Resource Factory
//!
//! The pool owns bookkeeping, never construction. Whatever actually builds a
//! projectile or a widget lives on the host side of this trait.

use crate::handle::{ResourceHandle, TemplateKey};

/// Creates and destroys resource instances for the pools.
///
/// One factory serves every pool in a registry; the template key tells it
/// which template to instantiate.
///
/// The pool removes a handle from its own tracking *before* calling
/// [`destroy_instance`](Self::destroy_instance), so each handle is destroyed
/// at most once. Implementations do not need to guard against double destroy.
pub trait ResourceFactory {
    /// Handle type produced by this factory.
    type Handle: ResourceHandle;

    /// Creates one inactive instance of `template`.
    ///
    /// The returned handle must report `template` from
    /// [`ResourceHandle::template_key`].
    fn create_instance(&mut self, template: TemplateKey) -> Self::Handle;

    /// Destroys an instance for good.
    fn destroy_instance(&mut self, handle: Self::Handle);
}
