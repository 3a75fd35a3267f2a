//! # OROBOROS Pool
//!
//! Instance recycling for short-lived game objects: projectiles, damage
//! numbers, hit sparks, transient UI widgets.
//!
//! ## Architecture
//!
//! ```text
//! caller ──> PoolRegistry ──> Pool (per template) ──> ResourceFactory
//!                 │
//!                 ├──> DelayedReleaseScheduler (recycle after N seconds)
//!                 └──< ScopeLifecycleNotifier (level change => teardown)
//! ```
//!
//! ## Rules
//!
//! 1. **The registry is the only entry point** - pools are never touched directly
//! 2. **Single-threaded, tick-driven** - `tick(dt)` first, then gameplay, every step
//! 3. **Hard limit means backpressure** - a full pool returns `None`, not an error
//! 4. **Every instance is destroyed exactly once** - including checked-out ones at teardown
//!
//! ## Example
//!
//! ```rust,ignore
//! use oroboros_pool::{PlacementHints, PoolConfig, PoolRegistry, ScopeEventBus, ScopeId, TemplateKey};
//!
//! const BULLET: TemplateKey = TemplateKey::new(1);
//!
//! let mut scopes = ScopeEventBus::new(ScopeId(0));
//! let mut registry = PoolRegistry::with_notifier(factory, &mut scopes);
//! registry.register(PoolConfig::new(BULLET, "Bullet").with_preallocate(32).with_hard_limit(64))?;
//!
//! registry.tick(dt);
//! if let Some(bullet) = registry.acquire(BULLET, &PlacementHints::at(muzzle))? {
//!     registry.recycle_after_delay(bullet, 2.0)?;
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod factory;
pub mod handle;
pub mod observer;
pub mod placement;
pub mod pool;
pub mod registry;
pub mod scheduler;
pub mod scope;

#[cfg(test)]
mod testing;

pub use config::{PoolConfig, RegistryConfig};
pub use error::{PoolError, PoolResult};
pub use factory::ResourceFactory;
pub use handle::{HandleState, InstanceHandle, ResourceHandle, TemplateKey};
pub use observer::{FnObserver, LifecycleEvent, ObserverId, PoolObserver};
pub use placement::{ParentRef, PlacementApplier, PlacementHints};
pub use pool::{Pool, PoolStats, TeardownReport};
pub use registry::{PoolRegistry, RecycleCallback, RecycleOutcome, RegistryStats};
pub use scheduler::{DelayedReleaseScheduler, PendingRelease, SchedulerStats};
pub use scope::{ScopeEventBus, ScopeId, ScopeLifecycleNotifier, ScopeTransition, SubscriptionId};
