//! # Pool Error Types
//!
//! All errors that can occur while registering, acquiring or releasing
//! pooled instances.
//!
//! Hitting a hard limit is NOT an error. `acquire` returns `Ok(None)` and the
//! caller picks its own retry/drop policy.

use thiserror::Error;

use crate::handle::TemplateKey;

/// Errors that can occur in the pooling system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// A pool with this template key is already registered.
    ///
    /// The original pool is left untouched.
    #[error("duplicate registration: pool {key} is already registered")]
    DuplicateRegistration {
        /// The conflicting key.
        key: TemplateKey,
    },

    /// No pool is registered under this template key.
    #[error("pool not found: {key}")]
    PoolNotFound {
        /// The key that failed to resolve.
        key: TemplateKey,
    },

    /// A handle was released that is not currently checked out of its pool.
    ///
    /// Debug builds assert before this is ever returned.
    #[error("handle {handle} is not active in pool {key}")]
    NotActive {
        /// Owning pool.
        key: TemplateKey,
        /// Debug rendering of the offending handle.
        handle: String,
    },

    /// Invalid pool configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The registry is already subscribed to a scope notifier.
    #[error("registry already subscribed to scope notifications")]
    AlreadySubscribed,
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
