//! # Template Pool
//!
//! Idle/outstanding bookkeeping for the instances of one template.
//!
//! ## Accounting
//!
//! ```text
//!             factory.create_instance
//!                     │
//!                     v
//!   ┌──────────── idle stack (LIFO) ────────────┐
//!   │  pop on acquire          push on release  │
//!   └──────┬─────────────────────────────^──────┘
//!          v                             │
//!      active set  ──────────────────────┘
//!          │
//!          └── force_destroy / teardown ──> factory.destroy_instance
//! ```
//!
//! A handle is in exactly one of {idle stack, active set} while the pool
//! tracks it. With a hard limit, `created_total` never exceeds the limit.
//!
//! # Thread Safety
//!
//! This pool is NOT thread-safe. It is driven from the host's update loop.

use std::collections::HashSet;

use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
use crate::factory::ResourceFactory;
use crate::handle::{HandleState, ResourceHandle, TemplateKey};
use crate::observer::{LifecycleEvent, ObserverId, ObserverList, PoolObserver};

/// Counters for one pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Handles currently on the idle stack.
    pub idle: usize,
    /// Handles currently checked out.
    pub outstanding: usize,
    /// Instances ever created by this pool.
    pub created_total: usize,
    /// Instances destroyed by this pool.
    pub destroyed_total: usize,
    /// Successful acquires.
    pub acquire_count: u64,
    /// Successful releases.
    pub release_count: u64,
    /// Acquires that returned nothing because the hard limit was reached.
    pub backpressure_count: u64,
    /// Highest outstanding count observed.
    pub peak_outstanding: usize,
}

/// What a teardown destroyed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Pool that was torn down.
    pub key: Option<TemplateKey>,
    /// Idle instances destroyed.
    pub idle_destroyed: usize,
    /// Instances with a pending deferred release, force-destroyed.
    pub pending_destroyed: usize,
    /// Other checked-out instances, force-destroyed.
    pub active_destroyed: usize,
}

impl TeardownReport {
    /// Total instances destroyed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.idle_destroyed + self.pending_destroyed + self.active_destroyed
    }
}

/// Pool of reusable instances for one template.
///
/// The factory is not owned by the pool; every method that may create or
/// destroy instances borrows it. This lets one factory serve every pool in a
/// registry.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool = Pool::new(PoolConfig::new(BULLET, "Bullet").with_hard_limit(5))?;
/// pool.initialize(5, &mut factory);
///
/// let bullet = pool.acquire(&mut factory).expect("under the limit");
/// pool.release(bullet)?;
/// ```
pub struct Pool<H> {
    config: PoolConfig,
    /// LIFO idle stack. Top is the most recently released handle.
    idle: Vec<H>,
    /// Checked-out handles.
    active: HashSet<H>,
    observers: ObserverList<H>,
    stats: PoolStats,
    initialized: bool,
}

impl<H: ResourceHandle> Pool<H> {
    /// Creates an empty, uninitialized pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;
        Ok(Self {
            idle: Vec::with_capacity(config.preallocate),
            active: HashSet::with_capacity(config.preallocate),
            config,
            observers: ObserverList::new(),
            stats: PoolStats::default(),
            initialized: false,
        })
    }

    /// Returns the template key.
    #[inline]
    #[must_use]
    pub const fn key(&self) -> TemplateKey {
        self.config.key
    }

    /// Returns the display name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the configuration the pool was built from.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Whether the pool survives scope transitions.
    #[inline]
    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        self.config.persist_between_scopes
    }

    /// Whether [`initialize`](Self::initialize) has run.
    #[inline]
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Effective hard limit, `None` when unlimited.
    #[inline]
    #[must_use]
    pub const fn hard_limit(&self) -> Option<usize> {
        self.config.limit()
    }

    /// Number of handles on the idle stack.
    #[inline]
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Number of handles checked out.
    #[inline]
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.active.len()
    }

    /// Instances ever created by this pool.
    #[inline]
    #[must_use]
    pub const fn created_total(&self) -> usize {
        self.stats.created_total
    }

    /// Instances that may still be created, `None` when unlimited.
    #[must_use]
    pub fn headroom(&self) -> Option<usize> {
        self.hard_limit()
            .map(|limit| limit.saturating_sub(self.stats.created_total))
    }

    /// Returns a snapshot of the pool counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.len(),
            outstanding: self.active.len(),
            ..self.stats
        }
    }

    /// Where `handle` sits in this pool, `None` if the pool does not track it.
    ///
    /// The pool cannot tell `Active` from `PendingRelease`; the registry
    /// refines that.
    #[must_use]
    pub fn state_of(&self, handle: H) -> Option<HandleState> {
        if self.active.contains(&handle) {
            Some(HandleState::Active)
        } else if self.idle.contains(&handle) {
            Some(HandleState::Idle)
        } else {
            None
        }
    }

    /// True if `handle` is currently checked out of this pool.
    #[inline]
    #[must_use]
    pub fn is_active(&self, handle: H) -> bool {
        self.active.contains(&handle)
    }

    /// Iterates over the checked-out handles, in no particular order.
    pub fn active_handles(&self) -> impl Iterator<Item = H> + '_ {
        self.active.iter().copied()
    }

    /// Registers a lifecycle observer. Observers run in registration order.
    pub fn add_observer(&mut self, observer: Box<dyn PoolObserver<H>>) -> ObserverId {
        self.observers.add(observer)
    }

    /// Removes an observer. Returns false if it was not registered.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Fills the idle stack with `preallocate` fresh instances.
    ///
    /// The count is clamped to the hard limit. Runs once; later calls are
    /// ignored.
    ///
    /// # Returns
    ///
    /// The number of instances created.
    pub fn initialize<F>(&mut self, preallocate: usize, factory: &mut F) -> usize
    where
        F: ResourceFactory<Handle = H>,
    {
        if self.initialized {
            tracing::warn!("Pool {} ({}) initialized twice, ignoring", self.key(), self.name());
            return 0;
        }
        self.initialized = true;

        let created = self.create_batch(preallocate, factory);
        if created < preallocate {
            tracing::warn!(
                "Pool {} ({}): preallocation clamped from {} to {} by hard limit",
                self.key(),
                self.name(),
                preallocate,
                created
            );
        }
        tracing::debug!(
            "Pool {} ({}) initialized with {} instance(s)",
            self.key(),
            self.name(),
            created
        );
        created
    }

    /// Checks out an instance.
    ///
    /// Reuses the most recently released instance first. An empty idle stack
    /// grows by `growth_batch` instances (clamped to the hard limit).
    ///
    /// # Returns
    ///
    /// The handle, or `None` if the hard limit is reached. `None` is
    /// backpressure, not an error.
    pub fn acquire<F>(&mut self, factory: &mut F) -> Option<H>
    where
        F: ResourceFactory<Handle = H>,
    {
        if self.idle.is_empty() {
            let grown = self.create_batch(self.config.growth_batch, factory);
            if grown > 0 {
                tracing::debug!(
                    "Pool {} ({}) grew by {} instance(s), {} created in total",
                    self.key(),
                    self.name(),
                    grown,
                    self.stats.created_total
                );
            }
        }

        let Some(handle) = self.idle.pop() else {
            self.stats.backpressure_count += 1;
            return None;
        };

        self.active.insert(handle);
        self.stats.acquire_count += 1;
        self.stats.peak_outstanding = self.stats.peak_outstanding.max(self.active.len());
        self.observers.notify(LifecycleEvent::Acquired, handle);

        Some(handle)
    }

    /// Returns a checked-out instance to the idle stack.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::NotActive`] if `handle` is not checked out of this
    /// pool. Debug builds panic instead. The idle stack is never touched for
    /// such a handle, so it cannot hold duplicates.
    pub fn release(&mut self, handle: H) -> PoolResult<()> {
        let was_active = self.active.remove(&handle);
        debug_assert!(
            was_active,
            "released handle {handle:?} is not active in pool {}",
            self.key()
        );
        if !was_active {
            tracing::warn!(
                "Pool {} ({}): ignoring release of inactive handle {:?}",
                self.key(),
                self.name(),
                handle
            );
            return Err(PoolError::NotActive {
                key: self.key(),
                handle: format!("{handle:?}"),
            });
        }

        self.idle.push(handle);
        self.stats.release_count += 1;
        self.observers.notify(LifecycleEvent::Released, handle);
        Ok(())
    }

    /// Destroys a checked-out instance without returning it to the stack.
    ///
    /// `on_destroy` fires, `on_release` does not.
    ///
    /// # Returns
    ///
    /// False if `handle` was not checked out of this pool.
    pub fn force_destroy<F>(&mut self, handle: H, factory: &mut F) -> bool
    where
        F: ResourceFactory<Handle = H>,
    {
        if !self.active.remove(&handle) {
            return false;
        }
        self.destroy_untracked(handle, factory);
        true
    }

    /// Destroys every instance the pool still tracks and drops all observers.
    ///
    /// Idle instances go first, in stack order (top first). Checked-out
    /// instances are force-destroyed afterwards rather than orphaned.
    pub fn teardown<F>(&mut self, factory: &mut F) -> TeardownReport
    where
        F: ResourceFactory<Handle = H>,
    {
        let mut report = TeardownReport {
            key: Some(self.key()),
            ..TeardownReport::default()
        };

        while let Some(handle) = self.idle.pop() {
            self.destroy_untracked(handle, factory);
            report.idle_destroyed += 1;
        }

        let active: Vec<H> = self.active.drain().collect();
        for handle in active {
            self.destroy_untracked(handle, factory);
            report.active_destroyed += 1;
        }

        if report.active_destroyed > 0 {
            tracing::warn!(
                "Pool {} ({}): force-destroyed {} checked-out instance(s) at teardown",
                self.key(),
                self.name(),
                report.active_destroyed
            );
        }

        self.observers.clear();
        self.initialized = false;
        report
    }

    /// Creates up to `count` instances onto the idle stack, honoring the
    /// hard limit.
    fn create_batch<F>(&mut self, count: usize, factory: &mut F) -> usize
    where
        F: ResourceFactory<Handle = H>,
    {
        let count = self.headroom().map_or(count, |headroom| count.min(headroom));
        for _ in 0..count {
            let handle = factory.create_instance(self.key());
            debug_assert_eq!(
                handle.template_key(),
                self.key(),
                "factory returned a handle for the wrong template"
            );
            self.idle.push(handle);
        }
        self.stats.created_total += count;
        count
    }

    /// The handle must already be removed from the idle stack and active set.
    fn destroy_untracked<F>(&mut self, handle: H, factory: &mut F)
    where
        F: ResourceFactory<Handle = H>,
    {
        self.observers.notify(LifecycleEvent::Destroyed, handle);
        factory.destroy_instance(handle);
        self.stats.destroyed_total += 1;
    }
}
