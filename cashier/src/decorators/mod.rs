//! Decorator strategies.
//!
//! Every decorator wraps a cache key, a [`Serializer`], a [`Facade`], and an
//! upstream async computation, and decides when to serve cached data versus
//! calling through. They're free functions rather than a trait object
//! because each strategy needs a different argument shape (a condition
//! predicate here, a listed-exception predicate there); a shared trait would
//! either lose that precision or force every caller through the union of
//! all of it.

pub mod bloom;
pub mod circuit_breaker;
pub mod early;
pub mod failover;
pub mod hit;
pub mod iterator;
pub mod locked;
pub mod rate_limit;
pub mod simple;
pub mod soft;
pub mod thunder;

use cashier_core::Cacheable;

use crate::error::CacheError;

pub(crate) fn encode<T: Cacheable>(serializer: &cashier_backend::Serializer, value: &T) -> Result<cashier_core::Raw, CacheError> {
    serializer.encode(value).map_err(|e| CacheError::Backend(cashier_backend::BackendError::from(e)))
}

pub(crate) fn decode<T: Cacheable>(serializer: &cashier_backend::Serializer, raw: &[u8]) -> Option<T> {
    serializer.decode(raw).ok()
}
