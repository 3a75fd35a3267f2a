//! # Pool Configuration
//!
//! Pool layout is data, not code. A registry config is read once at startup
//! from TOML:
//!
//! ```toml
//! [[pool]]
//! key = 1
//! name = "Bullet"
//! preallocate = 32
//! impose_hard_limit = true
//! hard_limit = 64
//!
//! [[pool]]
//! key = 2
//! name = "DamageNumber"
//! persist_between_scopes = true
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, PoolResult};
use crate::handle::TemplateKey;

/// Default number of instances created at initialization.
pub const DEFAULT_PREALLOCATE: usize = 5;
/// Default hard limit (only enforced when `impose_hard_limit` is set).
pub const DEFAULT_HARD_LIMIT: usize = 10;
/// Default number of instances created when an empty pool grows.
pub const DEFAULT_GROWTH_BATCH: usize = 2;
/// Largest allowed growth batch.
pub const MAX_GROWTH_BATCH: usize = 3;

/// Configuration of a single pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Template key. Unique per registry.
    pub key: TemplateKey,
    /// Human-readable name, for logs only.
    #[serde(default)]
    pub name: String,
    /// Instances created eagerly at registration.
    #[serde(default = "default_preallocate")]
    pub preallocate: usize,
    /// Whether `hard_limit` is enforced.
    #[serde(default)]
    pub impose_hard_limit: bool,
    /// Maximum instances ever created, when enforced.
    #[serde(default = "default_hard_limit")]
    pub hard_limit: usize,
    /// Survive scope transitions.
    #[serde(default)]
    pub persist_between_scopes: bool,
    /// Instances created per growth step when the idle stack runs dry.
    #[serde(default = "default_growth_batch")]
    pub growth_batch: usize,
}

const fn default_preallocate() -> usize {
    DEFAULT_PREALLOCATE
}

const fn default_hard_limit() -> usize {
    DEFAULT_HARD_LIMIT
}

const fn default_growth_batch() -> usize {
    DEFAULT_GROWTH_BATCH
}

impl PoolConfig {
    /// Creates a config with default sizing and no hard limit.
    #[must_use]
    pub fn new(key: TemplateKey, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            preallocate: DEFAULT_PREALLOCATE,
            impose_hard_limit: false,
            hard_limit: DEFAULT_HARD_LIMIT,
            persist_between_scopes: false,
            growth_batch: DEFAULT_GROWTH_BATCH,
        }
    }

    /// Sets the preallocation count.
    #[must_use]
    pub const fn with_preallocate(mut self, count: usize) -> Self {
        self.preallocate = count;
        self
    }

    /// Enforces a hard limit of `limit` instances.
    #[must_use]
    pub const fn with_hard_limit(mut self, limit: usize) -> Self {
        self.impose_hard_limit = true;
        self.hard_limit = limit;
        self
    }

    /// Marks the pool as surviving scope transitions.
    #[must_use]
    pub const fn persistent(mut self) -> Self {
        self.persist_between_scopes = true;
        self
    }

    /// Sets the growth batch size.
    #[must_use]
    pub const fn with_growth_batch(mut self, batch: usize) -> Self {
        self.growth_batch = batch;
        self
    }

    /// Effective hard limit, `None` when unlimited.
    #[inline]
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        if self.impose_hard_limit {
            Some(self.hard_limit)
        } else {
            None
        }
    }

    /// Checks the config for values the pool cannot honor.
    ///
    /// A preallocation above the hard limit is NOT rejected; the pool clamps
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if the growth batch is outside
    /// `1..=3` or a hard limit of zero is imposed.
    pub fn validate(&self) -> PoolResult<()> {
        if !(1..=MAX_GROWTH_BATCH).contains(&self.growth_batch) {
            return Err(PoolError::InvalidConfig(format!(
                "pool {} ({}): growth_batch must be in 1..={MAX_GROWTH_BATCH}, got {}",
                self.key, self.name, self.growth_batch
            )));
        }
        if self.impose_hard_limit && self.hard_limit == 0 {
            return Err(PoolError::InvalidConfig(format!(
                "pool {} ({}): hard_limit must be greater than zero",
                self.key, self.name
            )));
        }
        Ok(())
    }
}

/// Configuration of a whole registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Pools to register, in order.
    #[serde(default, rename = "pool")]
    pub pools: Vec<PoolConfig>,
}

impl RegistryConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] on parse errors or failed
    /// validation.
    pub fn from_toml_str(source: &str) -> PoolResult<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| PoolError::InvalidConfig(format!("Failed to parse pool config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if the file cannot be read or is
    /// invalid.
    pub fn load(path: impl AsRef<Path>) -> PoolResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            PoolError::InvalidConfig(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Validates every pool and checks keys are unique.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] for an invalid pool and
    /// [`PoolError::DuplicateRegistration`] for a repeated key.
    pub fn validate(&self) -> PoolResult<()> {
        let mut seen = HashSet::with_capacity(self.pools.len());
        for pool in &self.pools {
            pool.validate()?;
            if !seen.insert(pool.key) {
                return Err(PoolError::DuplicateRegistration { key: pool.key });
            }
        }
        Ok(())
    }
}
