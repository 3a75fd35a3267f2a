//! # Handles and Template Keys
//!
//! Pools never see a concrete resource type. They juggle opaque handles
//! (entity ids, GPU slots, widget ids) and ask the factory to create or destroy
//! the thing behind them.
//!
//! Every handle knows which template it was created from. That is how a bare
//! `release(handle)` finds its way back to the owning pool.

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Stable identifier of a resource template and of the pool that recycles it.
///
/// Keys are assigned by the template definition, never derived from a display
/// name, so two unrelated templates that share a name cannot collide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct TemplateKey(u32);

impl TemplateKey {
    /// Creates a key from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw key value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Capabilities a pooled handle must have.
///
/// Handles are small `Copy` identifiers. Destruction is not a method on the
/// handle; it goes through [`ResourceFactory::destroy_instance`] so the pool
/// can guarantee a handle is destroyed exactly once.
///
/// [`ResourceFactory::destroy_instance`]: crate::factory::ResourceFactory::destroy_instance
pub trait ResourceHandle: Copy + Eq + Hash + fmt::Debug {
    /// Template this instance was created from.
    fn template_key(&self) -> TemplateKey;
}

/// Ready-made handle for hosts without an id type of their own.
///
/// Layout mirrors an entity id: the owning template plus a serial number
/// unique within that template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceHandle {
    key: TemplateKey,
    serial: u32,
}

impl InstanceHandle {
    /// Creates a handle.
    ///
    /// # Arguments
    ///
    /// * `key` - Template the instance belongs to
    /// * `serial` - Per-template serial number
    #[inline]
    #[must_use]
    pub const fn new(key: TemplateKey, serial: u32) -> Self {
        Self { key, serial }
    }

    /// Returns the per-template serial number.
    #[inline]
    #[must_use]
    pub const fn serial(self) -> u32 {
        self.serial
    }
}

impl ResourceHandle for InstanceHandle {
    #[inline]
    fn template_key(&self) -> TemplateKey {
        self.key
    }
}

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.serial)
    }
}

/// Lifecycle state of a tracked handle.
///
/// ```text
/// Idle ──acquire──> Active ──release──────────────> Idle
///                     │
///                     └──recycle_after_delay──> PendingRelease ──timer──> Idle
///
/// Scope teardown destroys from any state. Destroyed handles are untracked.
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleState {
    /// Owned by the pool, waiting on the idle stack.
    Idle,
    /// Checked out by a caller.
    Active,
    /// Checked out, with a deferred release scheduled.
    PendingRelease,
}
