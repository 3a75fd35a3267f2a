//! # Pool Soak Simulation
//!
//! Runs a deterministic 60Hz simulation against a [`PoolRegistry`] and checks
//! the lifecycle invariants every step:
//! - no pool ever exceeds its hard limit
//! - every instance is destroyed exactly once
//! - nothing leaks after shutdown
//!
//! Usage: `pool_soak [config.toml]`. Without a path the built-in layout is used.

use std::collections::HashSet;
use std::process::ExitCode;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use oroboros_pool::{
    InstanceHandle, PlacementHints, PoolError, PoolRegistry, RegistryConfig, ResourceFactory,
    ResourceHandle, ScopeEventBus, ScopeId, TemplateKey,
};

/// Time step per tick (60 Hz).
const DT: f32 = 1.0 / 60.0;
/// Simulated duration in ticks (5 minutes).
const TICKS: u32 = 60 * 300;
/// A scope change happens every this many ticks.
const SCOPE_EVERY: u32 = 60 * 20;
/// Fixed seed. Same seed, same run.
const SEED: u64 = 0x00B0_B005;
/// Longest deferred recycle delay, in seconds.
const MAX_DELAY: f32 = 3.0;

/// Layout used when no config path is given.
const BUILTIN_CONFIG: &str = r#"
[[pool]]
key = 1
name = "Bullet"
preallocate = 32
impose_hard_limit = true
hard_limit = 64
growth_batch = 3

[[pool]]
key = 2
name = "HitSpark"
preallocate = 8

[[pool]]
key = 3
name = "DamageNumber"
preallocate = 4
impose_hard_limit = true
hard_limit = 16
persist_between_scopes = true
"#;

/// Factory that tracks which instances are alive.
#[derive(Default)]
struct LedgerFactory {
    next_serial: u32,
    alive: HashSet<InstanceHandle>,
    created: u64,
    destroyed: u64,
    double_destroys: u64,
}

impl ResourceFactory for LedgerFactory {
    type Handle = InstanceHandle;

    fn create_instance(&mut self, template: TemplateKey) -> InstanceHandle {
        self.next_serial += 1;
        let handle = InstanceHandle::new(template, self.next_serial);
        self.alive.insert(handle);
        self.created += 1;
        handle
    }

    fn destroy_instance(&mut self, handle: InstanceHandle) {
        if self.alive.remove(&handle) {
            self.destroyed += 1;
        } else {
            self.double_destroys += 1;
        }
    }
}

fn load_config() -> Result<RegistryConfig, String> {
    match std::env::args().nth(1) {
        Some(path) => RegistryConfig::load(&path).map_err(|e| e.to_string()),
        None => RegistryConfig::from_toml_str(BUILTIN_CONFIG).map_err(|e| e.to_string()),
    }
}

fn main() -> ExitCode {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pool_soak: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║           POOL SOAK SIMULATION                                   ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();
    println!("Configuration:");
    println!("  Pools:         {}", config.pools.len());
    println!("  Ticks:         {TICKS} ({}s at 60Hz)", TICKS / 60);
    println!("  Scope change:  every {}s", SCOPE_EVERY / 60);
    println!("  Seed:          {SEED:#x}");
    println!();

    let mut scopes = ScopeEventBus::new(ScopeId(0));
    let mut registry = PoolRegistry::with_notifier(LedgerFactory::default(), &mut scopes);
    if let Err(e) = registry.register_all(&config) {
        eprintln!("pool_soak: {e}");
        return ExitCode::FAILURE;
    }

    let keys: Vec<TemplateKey> = config.pools.iter().map(|pool| pool.key).collect();
    let limits: Vec<Option<usize>> = config.pools.iter().map(|pool| pool.limit()).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut live: Vec<InstanceHandle> = Vec::new();
    let mut violations = 0_u64;
    let mut backpressure = 0_u64;
    let mut stale_releases = 0_u64;

    for step in 1..=TICKS {
        registry.tick(DT);

        for _ in 0..rng.gen_range(0..4) {
            let key = keys[rng.gen_range(0..keys.len())];
            match registry.acquire(key, &PlacementHints::NONE) {
                Ok(Some(handle)) => live.push(handle),
                Ok(None) => backpressure += 1,
                Err(e) => {
                    eprintln!("pool_soak: {e}");
                    violations += 1;
                }
            }
        }

        if !live.is_empty() && rng.gen_bool(0.6) {
            let handle = live.swap_remove(rng.gen_range(0..live.len()));
            let result = if rng.gen_bool(0.3) {
                registry.release(handle)
            } else {
                registry
                    .recycle_after_delay(handle, rng.gen_range(0.0..MAX_DELAY))
                    .map(|_| ())
            };
            if let Err(e) = result {
                eprintln!("pool_soak: {e}");
                violations += 1;
            }
        }

        for (key, limit) in keys.iter().zip(&limits) {
            if let (Some(limit), Some(stats)) = (limit, registry.pool_stats(*key)) {
                if stats.idle + stats.outstanding > *limit {
                    eprintln!("pool_soak: {key} over limit at tick {step}");
                    violations += 1;
                }
            }
        }

        if step % SCOPE_EVERY == 0 {
            scopes.transition_to(ScopeId(step / SCOPE_EVERY));
            registry.pump_scope_events();

            // Gameplay still holds handles from the torn-down pools
            let (kept, stale): (Vec<_>, Vec<_>) = live
                .drain(..)
                .partition(|handle| registry.contains(handle.template_key()));
            live = kept;
            for handle in stale {
                match registry.release(handle) {
                    Err(PoolError::PoolNotFound { .. }) => stale_releases += 1,
                    other => {
                        eprintln!("pool_soak: stale release of {handle} returned {other:?}");
                        violations += 1;
                    }
                }
            }

            // The next scope brings its own pools
            for pool in &config.pools {
                if !registry.contains(pool.key) {
                    if let Err(e) = registry.register(pool.clone()) {
                        eprintln!("pool_soak: {e}");
                        violations += 1;
                    }
                }
            }
        }
    }

    let reports = registry.shutdown(&mut scopes);
    let stats = registry.stats();
    let factory = registry.factory();

    println!("┌─ Results ────────────────────────────────────────────────────────┐");
    println!("│ Scope transitions:  {:>10}", stats.scope_transitions);
    println!("│ Pools torn down:    {:>10}", stats.pools_torn_down);
    println!("│ Deferred fired:     {:>10}", stats.deferred_fired);
    println!("│ Backpressure hits:  {backpressure:>10}");
    println!("│ Stale releases:     {stale_releases:>10}");
    println!("│ Shutdown reports:   {:>10}", reports.len());
    println!("│ Created:            {:>10}", factory.created);
    println!("│ Destroyed:          {:>10}", factory.destroyed);
    println!("│ Still alive:        {:>10}", factory.alive.len());
    println!("│ Double destroys:    {:>10}", factory.double_destroys);
    println!("└──────────────────────────────────────────────────────────────────┘");

    if violations == 0 && factory.double_destroys == 0 && factory.alive.is_empty() {
        println!("PASS");
        ExitCode::SUCCESS
    } else {
        println!("FAIL ({violations} violations)");
        ExitCode::FAILURE
    }
}
