//! Facade-level error type.
//!
//! [`CacheError`] wraps [`BackendError`] and adds the policy-level signals
//! that only the facade (not an individual backend) can produce: a command
//! routed to a key with no matching prefix, a lock that couldn't be
//! acquired, a circuit breaker refusing calls, and so on.

use cashier_backend::BackendError;
use thiserror::Error;

/// Errors raised by the facade and its decorators.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A lower-layer backend operation failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A key matched no registered prefix and no default backend is configured.
    #[error("no backend registered for key {0:?}")]
    NoBackendForKey(String),

    /// The facade was used before any backend was registered.
    #[error("facade has no backends configured")]
    NotConfigured,

    /// A key referenced a backend name that was never registered.
    #[error("backend {0:?} is not available")]
    BackendNotAvailable(String),

    /// A mutual-exclusion lock could not be acquired within budget.
    #[error("key {0:?} is locked")]
    Locked(String),

    /// The circuit breaker for this call is open; failing fast.
    #[error("circuit breaker open for key {0:?}")]
    CircuitBreakerOpen(String),

    /// The rate limiter rejected this call.
    #[error("rate limit reached for key {0:?}")]
    RateLimitReached(String),

    /// A write specified a tag that was never registered via [`crate::tags::TagRegistry::register`].
    #[error("tag {0:?} is not registered for key {1:?}")]
    TagNotRegistered(String, String),

    /// An upstream call (the function a decorator wraps) failed and no
    /// cached/stale value was available to substitute.
    #[error(transparent)]
    Upstream(Box<dyn std::error::Error + Send + Sync>),
}

impl CacheError {
    /// Wraps an arbitrary upstream (wrapped-function) error.
    pub fn upstream(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        CacheError::Upstream(Box::new(error))
    }
}
