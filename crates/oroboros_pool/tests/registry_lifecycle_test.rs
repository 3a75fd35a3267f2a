//! # Registry Lifecycle Tests
//!
//! End-to-end checks of the pooling guarantees through the public API only:
//!
//! 1. **Accounting**: preallocation, round trips, hard limits
//! 2. **Deferred release**: split ticks, reschedule, release wins
//! 3. **Scopes**: teardown through a real `ScopeEventBus`
//! 4. **Soak**: random operation sequences never break the invariants
//!
//! Run with: cargo test -p oroboros_pool --test registry_lifecycle_test

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use oroboros_pool::{
    FnObserver, HandleState, InstanceHandle, LifecycleEvent, PlacementHints, PoolConfig, PoolError,
    PoolRegistry, RegistryConfig, ResourceFactory, ScopeEventBus, ScopeId, TemplateKey,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const BULLET: TemplateKey = TemplateKey::new(1);
const SPARK: TemplateKey = TemplateKey::new(2);
const HUD: TemplateKey = TemplateKey::new(3);

/// Factory that tracks which instances are alive and flags double destroys.
#[derive(Default)]
struct LedgerFactory {
    next_serial: u32,
    alive: HashSet<InstanceHandle>,
    created: usize,
    destroyed: usize,
}

impl ResourceFactory for LedgerFactory {
    type Handle = InstanceHandle;

    fn create_instance(&mut self, template: TemplateKey) -> InstanceHandle {
        let handle = InstanceHandle::new(template, self.next_serial);
        self.next_serial += 1;
        self.created += 1;
        self.alive.insert(handle);
        handle
    }

    fn destroy_instance(&mut self, handle: InstanceHandle) {
        assert!(self.alive.remove(&handle), "{handle} destroyed twice");
        self.destroyed += 1;
    }
}

fn take(registry: &mut PoolRegistry<LedgerFactory>, key: TemplateKey) -> Option<InstanceHandle> {
    registry.acquire(key, &PlacementHints::NONE).unwrap()
}

// ============================================================================
// ACCOUNTING
// ============================================================================

#[test]
fn test_initialize_without_limit() {
    let mut registry = PoolRegistry::new(LedgerFactory::default());
    registry
        .register(PoolConfig::new(SPARK, "Spark").with_preallocate(12))
        .unwrap();

    let stats = registry.pool_stats(SPARK).unwrap();
    assert_eq!(stats.idle, 12);
    assert_eq!(stats.outstanding, 0);
}

#[test]
fn test_round_trip_keeps_idle_count() {
    let mut registry = PoolRegistry::new(LedgerFactory::default());
    registry
        .register(PoolConfig::new(SPARK, "Spark").with_preallocate(4))
        .unwrap();

    for burst in 1..=6 {
        let idle_before = registry.pool_stats(SPARK).unwrap().idle;
        let handles: Vec<_> = (0..burst).map(|_| take(&mut registry, SPARK).unwrap()).collect();
        for handle in handles {
            registry.release(handle).unwrap();
        }
        let idle_after = registry.pool_stats(SPARK).unwrap().idle;
        // Growth may add instances on the first oversized burst, never lose any
        assert!(idle_after >= idle_before);
        assert_eq!(registry.pool_stats(SPARK).unwrap().outstanding, 0);
    }

    let idle = registry.pool_stats(SPARK).unwrap().idle;
    let handle = take(&mut registry, SPARK).unwrap();
    registry.release(handle).unwrap();
    assert_eq!(registry.pool_stats(SPARK).unwrap().idle, idle);
}

#[test]
fn test_hard_limit_never_exceeded() {
    let mut registry = PoolRegistry::new(LedgerFactory::default());
    registry
        .register(
            PoolConfig::new(BULLET, "Bullet")
                .with_preallocate(0)
                .with_growth_batch(3)
                .with_hard_limit(7),
        )
        .unwrap();

    let handles: Vec<_> = (0..7).map(|_| take(&mut registry, BULLET).unwrap()).collect();
    for _ in 0..10 {
        assert_eq!(take(&mut registry, BULLET), None);
    }

    assert_eq!(registry.factory().created, 7);
    assert_eq!(registry.pool_stats(BULLET).unwrap().backpressure_count, 10);
    assert_eq!(handles.iter().collect::<HashSet<_>>().len(), 7);
}

#[test]
fn test_bullet_pool_walkthrough() {
    let mut registry = PoolRegistry::new(LedgerFactory::default());
    registry
        .register(PoolConfig::new(BULLET, "Bullet").with_preallocate(5).with_hard_limit(5))
        .unwrap();

    let handles: Vec<_> = (0..5).map(|_| take(&mut registry, BULLET).unwrap()).collect();
    assert_eq!(take(&mut registry, BULLET), None);

    registry.release(handles[1]).unwrap();
    let stats = registry.pool_stats(BULLET).unwrap();
    assert_eq!((stats.idle, stats.outstanding), (1, 4));

    assert_eq!(take(&mut registry, BULLET), Some(handles[1]));
    let stats = registry.pool_stats(BULLET).unwrap();
    assert_eq!((stats.idle, stats.outstanding), (0, 5));
}

// ============================================================================
// DEFERRED RELEASE
// ============================================================================

#[test]
fn test_split_ticks_match_single_tick() {
    let run = |steps: &[f32]| {
        let mut registry = PoolRegistry::new(LedgerFactory::default());
        registry
            .register(PoolConfig::new(BULLET, "Bullet").with_preallocate(3))
            .unwrap();
        let handle = take(&mut registry, BULLET).unwrap();
        registry.recycle_after_delay(handle, 0.75).unwrap();

        let fired: usize = steps.iter().map(|&dt| registry.tick(dt)).sum();
        (fired, registry.state_of(handle), registry.pool_stats(BULLET).unwrap())
    };

    let single = run(&[0.75]);
    let halves = run(&[0.375, 0.375]);

    assert_eq!(single.0, 1);
    assert_eq!(single.1, Some(HandleState::Idle));
    assert_eq!(single, halves);
}

#[test]
fn test_reschedule_measures_from_second_call() {
    let mut registry = PoolRegistry::new(LedgerFactory::default());
    registry
        .register(PoolConfig::new(BULLET, "Bullet").with_preallocate(1))
        .unwrap();
    let handle = take(&mut registry, BULLET).unwrap();

    registry.recycle_after_delay(handle, 1.0).unwrap();
    registry.tick(0.75);
    registry.recycle_after_delay(handle, 1.0).unwrap();

    // 1.0s after the first request: must still be pending
    assert_eq!(registry.tick(0.25), 0);
    assert_eq!(registry.state_of(handle), Some(HandleState::PendingRelease));
    assert_eq!(registry.remaining_delay(handle), Some(0.75));

    assert_eq!(registry.tick(0.75), 1);
    assert_eq!(registry.state_of(handle), Some(HandleState::Idle));
    assert_eq!(registry.pool_stats(BULLET).unwrap().release_count, 1);
}

#[test]
fn test_fixed_step_recycle_fires_on_exact_frame() {
    const DT: f32 = 1.0 / 60.0;

    let mut registry = PoolRegistry::new(LedgerFactory::default());
    registry
        .register(PoolConfig::new(BULLET, "Bullet").with_preallocate(1))
        .unwrap();
    let handle = take(&mut registry, BULLET).unwrap();
    registry.recycle_after_delay(handle, 2.0).unwrap();

    // 2 seconds at 60Hz is exactly 120 frames
    for frame in 1..120 {
        assert_eq!(registry.tick(DT), 0, "fired early at frame {frame}");
    }
    assert_eq!(registry.tick(DT), 1);
    assert_eq!(registry.state_of(handle), Some(HandleState::Idle));
}

#[test]
fn test_release_then_acquire_same_step_sees_fired_release() {
    let mut registry = PoolRegistry::new(LedgerFactory::default());
    registry
        .register(PoolConfig::new(BULLET, "Bullet").with_preallocate(1).with_hard_limit(1))
        .unwrap();
    let handle = take(&mut registry, BULLET).unwrap();
    registry.recycle_after_delay(handle, 0.5).unwrap();

    assert_eq!(take(&mut registry, BULLET), None);
    registry.tick(0.5);
    assert_eq!(take(&mut registry, BULLET), Some(handle));
}

#[test]
fn test_recycle_callback_runs_after_release() {
    let mut registry = PoolRegistry::new(LedgerFactory::default());
    registry
        .register(PoolConfig::new(BULLET, "Bullet").with_preallocate(1))
        .unwrap();
    let handle = take(&mut registry, BULLET).unwrap();
    let seen = Rc::new(RefCell::new(None));

    let sink = Rc::clone(&seen);
    registry
        .recycle_after_delay_with(handle, 0.25, move |h| *sink.borrow_mut() = Some(h))
        .unwrap();
    registry.tick(0.25);

    assert_eq!(*seen.borrow(), Some(handle));
}

// ============================================================================
// SCOPES
// ============================================================================

#[test]
fn test_scope_change_tears_down_and_keeps_persistent() {
    let mut scopes = ScopeEventBus::new(ScopeId(10));
    let mut registry = PoolRegistry::with_notifier(LedgerFactory::default(), &mut scopes);
    registry
        .register_all(
            &RegistryConfig::from_toml_str(
                r#"
                [[pool]]
                key = 1
                name = "Bullet"
                preallocate = 4

                [[pool]]
                key = 3
                name = "Hud"
                preallocate = 2
                persist_between_scopes = true
                "#,
            )
            .unwrap(),
        )
        .unwrap();

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    registry
        .add_observer(
            BULLET,
            Box::new(FnObserver::new(move |event: LifecycleEvent, handle: InstanceHandle| {
                sink.borrow_mut().push((event, handle));
            })),
        )
        .unwrap();

    let pending = take(&mut registry, BULLET).unwrap();
    registry.recycle_after_delay(pending, 30.0).unwrap();
    let hud = take(&mut registry, HUD).unwrap();

    scopes.transition_to(ScopeId(11));
    registry.tick(1.0 / 60.0);

    assert!(!registry.contains(BULLET));
    assert!(registry.acquire(BULLET, &PlacementHints::NONE).is_err());
    assert_eq!(registry.state_of(pending), None);
    assert_eq!(registry.pending_count(), 0);

    // Persistent pool untouched
    assert_eq!(registry.state_of(hud), Some(HandleState::Active));
    assert_eq!(registry.pool_stats(HUD).unwrap().idle, 1);

    // Pending handle was force-destroyed, never released
    let events = events.borrow();
    assert!(events.contains(&(LifecycleEvent::Destroyed, pending)));
    assert!(!events.contains(&(LifecycleEvent::Released, pending)));
    assert_eq!(
        events.iter().filter(|(event, _)| *event == LifecycleEvent::Destroyed).count(),
        4
    );

    // Nothing fires later for the destroyed handle
    assert_eq!(registry.tick(60.0), 0);

    registry.shutdown(&mut scopes);
    assert_eq!(scopes.subscriber_count(), 0);
    assert!(registry.factory().alive.is_empty());
}

#[test]
fn test_release_after_scope_teardown_does_not_destroy_twice() {
    let mut scopes = ScopeEventBus::new(ScopeId(0));
    let mut registry = PoolRegistry::with_notifier(LedgerFactory::default(), &mut scopes);
    registry
        .register(PoolConfig::new(BULLET, "Bullet").with_preallocate(3))
        .unwrap();
    let held = take(&mut registry, BULLET).unwrap();
    let recycled_late = take(&mut registry, BULLET).unwrap();

    scopes.transition_to(ScopeId(1));
    registry.tick(0.0);
    assert!(!registry.factory().alive.contains(&held));

    // LedgerFactory panics on a second destroy
    assert!(matches!(
        registry.release(held),
        Err(PoolError::PoolNotFound { key }) if key == BULLET
    ));
    assert!(matches!(
        registry.recycle_after_delay(recycled_late, 1.0),
        Err(PoolError::PoolNotFound { key }) if key == BULLET
    ));
    assert_eq!(registry.factory().destroyed, registry.factory().created);

    // A handle the registry never tracked is still destroyed
    let foreign = registry.factory_mut().create_instance(SPARK);
    assert!(registry.release(foreign).is_err());
    assert!(!registry.factory().alive.contains(&foreign));
}

#[test]
fn test_reregistered_pool_starts_clean_after_teardown() {
    let mut scopes = ScopeEventBus::new(ScopeId(0));
    let mut registry = PoolRegistry::with_notifier(LedgerFactory::default(), &mut scopes);
    let bullets = PoolConfig::new(BULLET, "Bullet").with_preallocate(2);
    registry.register(bullets.clone()).unwrap();
    let held = take(&mut registry, BULLET).unwrap();

    scopes.transition_to(ScopeId(1));
    registry.tick(0.0);
    assert!(registry.release(held).is_err());

    registry.register(bullets).unwrap();
    let fresh = take(&mut registry, BULLET).unwrap();
    assert_ne!(fresh, held);
    registry.release(fresh).unwrap();
    assert_eq!(registry.pool_stats(BULLET).unwrap().idle, 2);

    registry.shutdown(&mut scopes);
    assert!(registry.factory().alive.is_empty());
}

#[test]
fn test_dropped_registry_subscription_is_pruned() {
    let mut scopes = ScopeEventBus::new(ScopeId(0));
    {
        let mut registry = PoolRegistry::with_notifier(LedgerFactory::default(), &mut scopes);
        registry
            .register(PoolConfig::new(BULLET, "Bullet").with_preallocate(1))
            .unwrap();
    }
    assert_eq!(scopes.subscriber_count(), 1);

    assert_eq!(scopes.transition_to(ScopeId(1)), 0);
    assert_eq!(scopes.subscriber_count(), 0);
}

#[test]
fn test_unregister_destroys_pending_and_idle() {
    let mut registry = PoolRegistry::new(LedgerFactory::default());
    registry
        .register(PoolConfig::new(BULLET, "Bullet").with_preallocate(3))
        .unwrap();
    let handle = take(&mut registry, BULLET).unwrap();
    registry.recycle_after_delay(handle, 1.0).unwrap();

    let report = registry.unregister(BULLET).unwrap();

    assert_eq!(report.pending_destroyed, 1);
    assert_eq!(report.idle_destroyed, 2);
    assert_eq!(report.active_destroyed, 0);
    assert!(registry.factory().alive.is_empty());
    assert_eq!(registry.tick(5.0), 0);
}

/// Factory whose destroy count outlives the registry.
struct SharedCountFactory {
    inner: LedgerFactory,
    destroyed: Rc<RefCell<usize>>,
}

impl ResourceFactory for SharedCountFactory {
    type Handle = InstanceHandle;

    fn create_instance(&mut self, template: TemplateKey) -> InstanceHandle {
        self.inner.create_instance(template)
    }

    fn destroy_instance(&mut self, handle: InstanceHandle) {
        self.inner.destroy_instance(handle);
        *self.destroyed.borrow_mut() += 1;
    }
}

#[test]
fn test_dropping_registry_destroys_everything() {
    let destroyed = Rc::new(RefCell::new(0));
    {
        let mut registry = PoolRegistry::new(SharedCountFactory {
            inner: LedgerFactory::default(),
            destroyed: Rc::clone(&destroyed),
        });
        registry
            .register(PoolConfig::new(BULLET, "Bullet").with_preallocate(3))
            .unwrap();
        registry
            .register(PoolConfig::new(HUD, "Hud").with_preallocate(2).persistent())
            .unwrap();
        let handle = registry.acquire(BULLET, &PlacementHints::NONE).unwrap().unwrap();
        registry.recycle_after_delay(handle, 1.0).unwrap();
    }
    assert_eq!(*destroyed.borrow(), 5);
}

// ============================================================================
// SOAK
// ============================================================================

#[test]
fn test_random_operations_keep_invariants() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x0B0B_0505);
    let mut scopes = ScopeEventBus::new(ScopeId(0));
    let mut registry = PoolRegistry::with_notifier(LedgerFactory::default(), &mut scopes);
    let configs = [
        PoolConfig::new(BULLET, "Bullet").with_preallocate(8).with_hard_limit(16),
        PoolConfig::new(SPARK, "Spark").with_preallocate(2).with_growth_batch(3),
        PoolConfig::new(HUD, "Hud").with_preallocate(1).persistent(),
    ];
    for config in &configs {
        registry.register(config.clone()).unwrap();
    }

    let mut held: Vec<InstanceHandle> = Vec::new();

    for step in 0..5_000 {
        registry.tick(1.0 / 60.0);
        held.retain(|handle| {
            matches!(
                registry.state_of(*handle),
                Some(HandleState::Active | HandleState::PendingRelease)
            )
        });

        match rng.gen_range(0..100) {
            0..=44 => {
                let key = configs[rng.gen_range(0..configs.len())].key;
                if let Ok(Some(handle)) = registry.acquire(key, &PlacementHints::NONE) {
                    held.push(handle);
                }
            }
            45..=69 if !held.is_empty() => {
                let handle = held.swap_remove(rng.gen_range(0..held.len()));
                registry.release(handle).unwrap();
            }
            70..=97 if !held.is_empty() => {
                let handle = held[rng.gen_range(0..held.len())];
                let delay = rng.gen_range(0.0..2.0_f32);
                registry.recycle_after_delay(handle, delay).unwrap();
            }
            98 => {
                scopes.transition_to(ScopeId(step));
            }
            _ => {}
        }

        // Re-register pools lost to a scope change
        for config in &configs {
            if !registry.contains(config.key) {
                registry.register(config.clone()).unwrap();
            }
        }

        let stats = registry.stats();
        let factory = registry.factory();
        assert_eq!(stats.idle + stats.outstanding, factory.alive.len());
        assert_eq!(factory.created - factory.destroyed, factory.alive.len());
        assert!(stats.pending <= stats.outstanding);

        let bullets = registry.pool_stats(BULLET).unwrap();
        assert!(bullets.created_total <= 16);
    }

    registry.shutdown(&mut scopes);
    assert!(registry.factory().alive.is_empty());
}
