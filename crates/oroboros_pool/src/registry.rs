//! # Pool Registry
//!
//! The single entry point the game talks to. Routes acquire/release calls to
//! the right pool, owns the deferred-release scheduler, and tears pools down
//! on scope transitions.
//!
//! ## Per-step ordering
//!
//! ```text
//! host loop step:
//!   1. registry.tick(dt)      <- scope transitions, then due deferred releases
//!   2. gameplay: acquire / release / recycle_after_delay
//! ```
//!
//! Ticking first means a release that fires this step and an acquire made
//! later in the same step see the same idle stack.
//!
//! ## Teardown of a pool
//!
//! 1. Cancel every pending deferred release of the pool and force-destroy
//!    those handles (on_destroy fires, on_release does not).
//! 2. Destroy the idle stack, then any remaining checked-out handles.
//! 3. Forget the pool. Its key no longer resolves.
//!
//! Callers may still hold handles that were checked out at teardown. Those
//! are remembered per key until the key is registered again, so a late
//! `release` reports `PoolNotFound` without destroying them a second time.

use std::collections::{HashMap, HashSet};

use crate::config::{PoolConfig, RegistryConfig};
use crate::error::{PoolError, PoolResult};
use crate::factory::ResourceFactory;
use crate::handle::{HandleState, ResourceHandle, TemplateKey};
use crate::observer::{ObserverId, PoolObserver};
use crate::placement::{PlacementApplier, PlacementHints};
use crate::pool::{Pool, PoolStats, TeardownReport};
use crate::scheduler::DelayedReleaseScheduler;
use crate::scope::{ScopeLifecycleNotifier, ScopeSubscription, ScopeTransition};

/// Callback run after a deferred release has put the handle back.
pub type RecycleCallback<H> = Box<dyn FnOnce(H)>;

/// How a `recycle_after_delay` request was handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecycleOutcome {
    /// A new timer was started.
    Scheduled,
    /// An existing timer for the handle was replaced.
    Rescheduled,
    /// The delay was not positive; the handle was released on the spot.
    ReleasedImmediately,
}

/// Aggregate registry counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Registered pools.
    pub pools: usize,
    /// Idle handles across all pools.
    pub idle: usize,
    /// Checked-out handles across all pools (pending ones included).
    pub outstanding: usize,
    /// Pending deferred releases.
    pub pending: usize,
    /// Scope transitions handled.
    pub scope_transitions: u64,
    /// Pools torn down (scope, unregister, shutdown).
    pub pools_torn_down: u64,
    /// Deferred releases that fired.
    pub deferred_fired: u64,
    /// Requests that named an unregistered pool.
    pub unknown_pool_requests: u64,
}

/// Owns every pool and the deferred-release scheduler.
///
/// Call [`shutdown`](Self::shutdown) to unsubscribe from the notifier.
/// Dropping the registry still tears every pool down, but it cannot reach
/// the notifier: the subscription ends when the channel receiver is dropped,
/// and a [`ScopeEventBus`](crate::scope::ScopeEventBus) prunes it on its next
/// publish.
///
/// # Example
///
/// ```rust,ignore
/// let mut scopes = ScopeEventBus::new(ScopeId(0));
/// let mut registry = PoolRegistry::with_notifier(factory, &mut scopes);
/// registry.register_all(&RegistryConfig::load("pools.toml")?)?;
///
/// // every frame
/// registry.tick(dt);
/// if let Some(bullet) = registry.acquire(BULLET, &PlacementHints::at(muzzle))? {
///     registry.recycle_after_delay(bullet, 2.0)?;
/// }
/// ```
pub struct PoolRegistry<F: ResourceFactory> {
    factory: F,
    pools: HashMap<TemplateKey, Pool<F::Handle>>,
    scheduler: DelayedReleaseScheduler<F::Handle, Option<RecycleCallback<F::Handle>>>,
    /// Pool -> handles with a pending deferred release.
    pending_index: HashMap<TemplateKey, HashSet<F::Handle>>,
    /// Torn-down pool -> handles that were checked out and force-destroyed.
    retired: HashMap<TemplateKey, HashSet<F::Handle>>,
    placement: Option<Box<dyn PlacementApplier<F::Handle>>>,
    subscription: Option<ScopeSubscription>,
    stats: RegistryStats,
}

impl<F: ResourceFactory> PoolRegistry<F> {
    /// Creates a registry that is not subscribed to scope notifications.
    ///
    /// Scope transitions can still be fed through
    /// [`handle_scope_transition`](Self::handle_scope_transition).
    #[must_use]
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            pools: HashMap::new(),
            scheduler: DelayedReleaseScheduler::new(),
            pending_index: HashMap::new(),
            retired: HashMap::new(),
            placement: None,
            subscription: None,
            stats: RegistryStats::default(),
        }
    }

    /// Creates a registry subscribed to `notifier`.
    #[must_use]
    pub fn with_notifier<N>(factory: F, notifier: &mut N) -> Self
    where
        N: ScopeLifecycleNotifier + ?Sized,
    {
        let mut registry = Self::new(factory);
        registry.subscription = Some(ScopeSubscription::open(notifier));
        registry
    }

    /// Subscribes to `notifier`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::AlreadySubscribed`] if a subscription exists.
    pub fn subscribe<N>(&mut self, notifier: &mut N) -> PoolResult<()>
    where
        N: ScopeLifecycleNotifier + ?Sized,
    {
        if self.subscription.is_some() {
            return Err(PoolError::AlreadySubscribed);
        }
        self.subscription = Some(ScopeSubscription::open(notifier));
        Ok(())
    }

    /// True while subscribed to a scope notifier.
    #[must_use]
    pub const fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Returns the factory.
    #[must_use]
    pub const fn factory(&self) -> &F {
        &self.factory
    }

    /// Returns the factory mutably.
    pub fn factory_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    /// Installs the hook that applies placement hints after an acquire.
    pub fn set_placement_applier(&mut self, applier: Box<dyn PlacementApplier<F::Handle>>) {
        self.placement = Some(applier);
    }

    /// Removes the placement hook.
    pub fn clear_placement_applier(&mut self) {
        self.placement = None;
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Creates, preallocates and stores a pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::DuplicateRegistration`] if the key is taken (the
    /// existing pool is untouched) and [`PoolError::InvalidConfig`] if the
    /// config is invalid.
    pub fn register(&mut self, config: PoolConfig) -> PoolResult<()> {
        if self.pools.contains_key(&config.key) {
            tracing::warn!(
                "Rejected duplicate registration of pool {} ({})",
                config.key,
                config.name
            );
            return Err(PoolError::DuplicateRegistration { key: config.key });
        }

        let preallocate = config.preallocate;
        let mut pool = Pool::new(config)?;
        pool.initialize(preallocate, &mut self.factory);
        tracing::debug!("Registered pool {} ({})", pool.key(), pool.name());
        // The factory may hand out the retired ids again from here on
        self.retired.remove(&pool.key());
        self.pools.insert(pool.key(), pool);
        Ok(())
    }

    /// Registers every pool in `config`.
    ///
    /// All-or-nothing: the config is validated and checked against the
    /// registered keys before anything is created.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register), plus config validation errors.
    pub fn register_all(&mut self, config: &RegistryConfig) -> PoolResult<usize> {
        config.validate()?;
        if let Some(taken) = config.pools.iter().find(|pool| self.pools.contains_key(&pool.key)) {
            return Err(PoolError::DuplicateRegistration { key: taken.key });
        }

        for pool in &config.pools {
            self.register(pool.clone())?;
        }
        Ok(config.pools.len())
    }

    /// Tears a pool down and forgets it, regardless of persistence.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::PoolNotFound`] if no such pool is registered.
    pub fn unregister(&mut self, key: TemplateKey) -> PoolResult<TeardownReport> {
        let pool = self.pools.remove(&key).ok_or(PoolError::PoolNotFound { key })?;
        Ok(self.teardown_pool(pool))
    }

    // ------------------------------------------------------------------
    // Acquire / release
    // ------------------------------------------------------------------

    /// Checks an instance out of the pool for `key` and applies `hints`.
    ///
    /// The placement hook only runs when an instance was handed out.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the pool is at its hard limit.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::PoolNotFound`] if no such pool is registered.
    pub fn acquire(
        &mut self,
        key: TemplateKey,
        hints: &PlacementHints,
    ) -> PoolResult<Option<F::Handle>> {
        let Some(pool) = self.pools.get_mut(&key) else {
            self.stats.unknown_pool_requests += 1;
            tracing::warn!("Acquire from unregistered pool {}", key);
            return Err(PoolError::PoolNotFound { key });
        };

        let handle = pool.acquire(&mut self.factory);
        if let (Some(handle), Some(placement)) = (handle, self.placement.as_mut()) {
            placement.apply_placement(handle, hints);
        }
        Ok(handle)
    }

    /// Returns `handle` to its pool right away.
    ///
    /// A pending deferred release for the handle is cancelled first; the
    /// explicit release wins and the deferred callback never runs.
    ///
    /// # Errors
    ///
    /// - [`PoolError::PoolNotFound`] if the handle's pool is not registered.
    ///   A handle the registry never tracked is destroyed through the
    ///   factory before returning. One that was force-destroyed when its
    ///   pool was torn down is left alone.
    /// - [`PoolError::NotActive`] if the handle is not checked out (debug
    ///   builds panic instead).
    pub fn release(&mut self, handle: F::Handle) -> PoolResult<()> {
        let key = handle.template_key();
        if self.scheduler.cancel(handle).is_some() {
            self.unindex_pending(key, handle);
        }

        if let Some(pool) = self.pools.get_mut(&key) {
            return pool.release(handle);
        }

        self.stats.unknown_pool_requests += 1;
        if self.retired.get(&key).is_some_and(|handles| handles.contains(&handle)) {
            tracing::warn!(
                "Release of {:?} after pool {} was torn down, already destroyed",
                handle,
                key
            );
            return Err(PoolError::PoolNotFound { key });
        }

        tracing::warn!(
            "Release of {:?} into unregistered pool {}, destroying it instead",
            handle,
            key
        );
        self.factory.destroy_instance(handle);
        Err(PoolError::PoolNotFound { key })
    }

    /// Releases `handle` after `delay` seconds of ticks.
    ///
    /// See [`recycle_after_delay_with`](Self::recycle_after_delay_with).
    ///
    /// # Errors
    ///
    /// Same as [`recycle_after_delay_with`](Self::recycle_after_delay_with).
    pub fn recycle_after_delay(
        &mut self,
        handle: F::Handle,
        delay: f32,
    ) -> PoolResult<RecycleOutcome> {
        self.schedule_recycle(handle, delay, None)
    }

    /// Releases `handle` after `delay` seconds of ticks, then runs `callback`.
    ///
    /// - A delay that is not positive, or a handle whose pool is not
    ///   registered, behaves as an immediate [`release`](Self::release).
    /// - An existing timer for the handle is replaced; its callback is
    ///   dropped without running. Only the latest request counts.
    ///
    /// # Errors
    ///
    /// - [`PoolError::PoolNotFound`] from the immediate-release fallback.
    /// - [`PoolError::NotActive`] if the handle is not checked out (debug
    ///   builds panic instead).
    pub fn recycle_after_delay_with<C>(
        &mut self,
        handle: F::Handle,
        delay: f32,
        callback: C,
    ) -> PoolResult<RecycleOutcome>
    where
        C: FnOnce(F::Handle) + 'static,
    {
        self.schedule_recycle(handle, delay, Some(Box::new(callback)))
    }

    fn schedule_recycle(
        &mut self,
        handle: F::Handle,
        delay: f32,
        callback: Option<RecycleCallback<F::Handle>>,
    ) -> PoolResult<RecycleOutcome> {
        let key = handle.template_key();
        let registered = self.pools.contains_key(&key);
        // NaN compares false, so it takes the immediate path too
        let positive = delay > 0.0;

        if !positive || !registered {
            self.release(handle)?;
            if let Some(callback) = callback {
                callback(handle);
            }
            return Ok(RecycleOutcome::ReleasedImmediately);
        }

        let active = self.pools.get(&key).is_some_and(|pool| pool.is_active(handle));
        debug_assert!(active, "deferred release of {handle:?} which is not checked out");
        if !active {
            tracing::warn!("Ignoring deferred release of inactive handle {:?}", handle);
            return Err(PoolError::NotActive {
                key,
                handle: format!("{handle:?}"),
            });
        }

        let replaced = self.scheduler.schedule(handle, key, delay, callback);
        self.pending_index.entry(key).or_default().insert(handle);

        Ok(if replaced.is_some() {
            RecycleOutcome::Rescheduled
        } else {
            RecycleOutcome::Scheduled
        })
    }

    /// Cancels a pending deferred release without releasing the handle.
    ///
    /// # Returns
    ///
    /// False if nothing was pending for `handle`.
    pub fn cancel_recycle(&mut self, handle: F::Handle) -> bool {
        if self.scheduler.cancel(handle).is_none() {
            return false;
        }
        self.unindex_pending(handle.template_key(), handle);
        true
    }

    // ------------------------------------------------------------------
    // Time and scopes
    // ------------------------------------------------------------------

    /// Advances the registry by `dt` seconds.
    ///
    /// Queued scope transitions are handled first, then every due deferred
    /// release is performed.
    ///
    /// # Returns
    ///
    /// The number of deferred releases that fired.
    pub fn tick(&mut self, dt: f32) -> usize {
        self.pump_scope_events();

        let fired = self.scheduler.tick(dt);
        let mut released = 0;
        for entry in fired {
            let handle = entry.handle;
            self.unindex_pending(entry.owner, handle);

            let Some(pool) = self.pools.get_mut(&entry.owner) else {
                // Teardown cancels timers, so this only happens if the
                // index and scheduler drifted apart.
                tracing::warn!(
                    "Deferred release of {:?} fired for missing pool {}, destroying it",
                    handle,
                    entry.owner
                );
                self.factory.destroy_instance(handle);
                continue;
            };

            match pool.release(handle) {
                Ok(()) => {
                    released += 1;
                    if let Some(callback) = entry.action {
                        callback(handle);
                    }
                }
                Err(e) => tracing::warn!("Deferred release failed: {e}"),
            }
        }

        self.stats.deferred_fired += released as u64;
        released
    }

    /// Handles every scope transition queued by the notifier.
    ///
    /// Called by [`tick`](Self::tick); exposed for hosts that want teardown
    /// to happen at a different point in the step.
    ///
    /// # Returns
    ///
    /// The number of transitions handled.
    pub fn pump_scope_events(&mut self) -> usize {
        let transitions = match &self.subscription {
            Some(subscription) => subscription.drain(),
            None => return 0,
        };

        for transition in &transitions {
            self.handle_scope_transition(transition);
        }
        transitions.len()
    }

    /// Tears down every non-persistent pool.
    ///
    /// Pools are torn down in key order.
    pub fn handle_scope_transition(&mut self, transition: &ScopeTransition) -> Vec<TeardownReport> {
        self.stats.scope_transitions += 1;

        let mut doomed: Vec<TemplateKey> = self
            .pools
            .values()
            .filter(|pool| !pool.is_persistent())
            .map(Pool::key)
            .collect();
        doomed.sort_unstable();

        let mut reports = Vec::with_capacity(doomed.len());
        for key in doomed {
            if let Some(pool) = self.pools.remove(&key) {
                reports.push(self.teardown_pool(pool));
            }
        }

        tracing::info!(
            "Scope {:?} -> {:?}: tore down {} pool(s), {} kept",
            transition.from,
            transition.to,
            reports.len(),
            self.pools.len()
        );
        reports
    }

    /// Unsubscribes from `notifier` and tears down every pool, persistent
    /// ones included.
    pub fn shutdown<N>(&mut self, notifier: &mut N) -> Vec<TeardownReport>
    where
        N: ScopeLifecycleNotifier + ?Sized,
    {
        if let Some(subscription) = self.subscription.take() {
            notifier.unsubscribe(subscription.id);
        }
        self.teardown_all()
    }

    fn teardown_all(&mut self) -> Vec<TeardownReport> {
        let mut keys: Vec<TemplateKey> = self.pools.keys().copied().collect();
        keys.sort_unstable();

        let mut reports = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(pool) = self.pools.remove(&key) {
                reports.push(self.teardown_pool(pool));
            }
        }
        reports
    }

    /// The pool must already be removed from `self.pools`.
    fn teardown_pool(&mut self, mut pool: Pool<F::Handle>) -> TeardownReport {
        let key = pool.key();
        self.retired
            .entry(key)
            .or_default()
            .extend(pool.active_handles());

        let mut pending: Vec<_> = self
            .pending_index
            .remove(&key)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|handle| self.scheduler.cancel(handle))
            .collect();
        pending.sort_unstable_by_key(|entry| entry.sequence());

        let mut pending_destroyed = 0;
        for entry in pending {
            if pool.force_destroy(entry.handle, &mut self.factory) {
                pending_destroyed += 1;
            }
        }

        let mut report = pool.teardown(&mut self.factory);
        report.pending_destroyed = pending_destroyed;
        self.stats.pools_torn_down += 1;

        tracing::debug!(
            "Tore down pool {} ({}): {} idle, {} pending, {} active destroyed",
            key,
            pool.name(),
            report.idle_destroyed,
            report.pending_destroyed,
            report.active_destroyed
        );
        report
    }

    fn unindex_pending(&mut self, key: TemplateKey, handle: F::Handle) {
        if let Some(handles) = self.pending_index.get_mut(&key) {
            handles.remove(&handle);
            if handles.is_empty() {
                self.pending_index.remove(&key);
            }
        }
    }

    // ------------------------------------------------------------------
    // Observers and introspection
    // ------------------------------------------------------------------

    /// Registers a lifecycle observer on the pool for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::PoolNotFound`] if no such pool is registered.
    pub fn add_observer(
        &mut self,
        key: TemplateKey,
        observer: Box<dyn PoolObserver<F::Handle>>,
    ) -> PoolResult<ObserverId> {
        self.pools
            .get_mut(&key)
            .map(|pool| pool.add_observer(observer))
            .ok_or(PoolError::PoolNotFound { key })
    }

    /// Removes an observer from the pool for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::PoolNotFound`] if no such pool is registered.
    pub fn remove_observer(&mut self, key: TemplateKey, id: ObserverId) -> PoolResult<bool> {
        self.pools
            .get_mut(&key)
            .map(|pool| pool.remove_observer(id))
            .ok_or(PoolError::PoolNotFound { key })
    }

    /// True if a pool is registered under `key`.
    #[must_use]
    pub fn contains(&self, key: TemplateKey) -> bool {
        self.pools.contains_key(&key)
    }

    /// Number of registered pools.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Registered keys in ascending order.
    #[must_use]
    pub fn keys(&self) -> Vec<TemplateKey> {
        let mut keys: Vec<TemplateKey> = self.pools.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Returns the pool for `key`.
    #[must_use]
    pub fn pool(&self, key: TemplateKey) -> Option<&Pool<F::Handle>> {
        self.pools.get(&key)
    }

    /// Returns the counters of the pool for `key`.
    #[must_use]
    pub fn pool_stats(&self, key: TemplateKey) -> Option<PoolStats> {
        self.pools.get(&key).map(Pool::stats)
    }

    /// Number of pending deferred releases across all pools.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }

    /// Number of pending deferred releases for the pool `key`.
    #[must_use]
    pub fn pending_for(&self, key: TemplateKey) -> usize {
        self.pending_index.get(&key).map_or(0, HashSet::len)
    }

    /// Seconds left before `handle` is released, if a release is pending.
    #[must_use]
    pub fn remaining_delay(&self, handle: F::Handle) -> Option<f32> {
        self.scheduler.remaining(handle)
    }

    /// Lifecycle state of `handle`, `None` if no registered pool tracks it.
    #[must_use]
    pub fn state_of(&self, handle: F::Handle) -> Option<HandleState> {
        let state = self.pools.get(&handle.template_key())?.state_of(handle)?;
        if state == HandleState::Active && self.scheduler.is_pending(handle) {
            Some(HandleState::PendingRelease)
        } else {
            Some(state)
        }
    }

    /// Returns aggregate counters.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let (idle, outstanding) = self
            .pools
            .values()
            .fold((0, 0), |(idle, out), pool| {
                (idle + pool.idle_count(), out + pool.outstanding())
            });
        RegistryStats {
            pools: self.pools.len(),
            idle,
            outstanding,
            pending: self.scheduler.len(),
            ..self.stats
        }
    }
}

impl<F: ResourceFactory> Drop for PoolRegistry<F> {
    fn drop(&mut self) {
        if let Some(subscription) = &self.subscription {
            tracing::debug!(
                "Registry dropped while subscribed ({:?}), the notifier prunes it on next publish",
                subscription.id
            );
        }
        if !self.pools.is_empty() {
            let reports = self.teardown_all();
            tracing::debug!("Registry dropped, tore down {} pool(s)", reports.len());
        }
    }
}
