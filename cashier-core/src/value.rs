//! Cached value types with expiration metadata.
//!
//! - [`CacheValue`] - cached data with optional expire/stale timestamps.
//! - [`CacheMeta`] - just the metadata, without the data.
//! - [`CacheState`] - the freshness classification of a [`CacheValue`].
//!
//! Cache entries have two time-based states: **stale** (still usable, should
//! be refreshed in the background) and **expired** (no longer valid). This
//! supports stale-while-revalidate strategies such as the `early` and `soft`
//! decorators.

use chrono::{DateTime, Utc};
use std::mem::size_of;
use std::time::Duration;

use crate::Raw;

/// Freshness classification of a cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState<T> {
    /// Data is fresh (neither stale nor expired).
    Actual(T),
    /// Data is stale but not expired; safe to serve while refreshing.
    Stale(T),
    /// Data has expired and must not be served as fresh.
    Expired(T),
}

impl<T> CacheState<T> {
    /// Returns the wrapped value regardless of freshness.
    pub fn into_inner(self) -> T {
        match self {
            CacheState::Actual(v) | CacheState::Stale(v) | CacheState::Expired(v) => v,
        }
    }

    /// True if the state still represents servable data (actual or stale).
    pub fn is_servable(&self) -> bool {
        !matches!(self, CacheState::Expired(_))
    }
}

/// A cached value with expiration metadata.
///
/// Wraps any data type `T` with optional timestamps for staleness and
/// expiration, enabling time-based invalidation and stale-while-revalidate
/// patterns (see the `early`/`soft` decorators).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheValue<T> {
    data: T,
    expire: Option<DateTime<Utc>>,
    stale: Option<DateTime<Utc>>,
}

impl<T> CacheValue<T> {
    /// Creates a new cache value with the given data and timestamps.
    pub fn new(data: T, expire: Option<DateTime<Utc>>, stale: Option<DateTime<Utc>>) -> Self {
        CacheValue {
            data,
            expire,
            stale,
        }
    }

    /// Wraps data with no expiry and no staleness deadline.
    pub fn unbounded(data: T) -> Self {
        CacheValue::new(data, None, None)
    }

    /// Returns a reference to the cached data.
    #[inline]
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Returns when the data expires (becomes invalid).
    #[inline]
    pub fn expire(&self) -> Option<DateTime<Utc>> {
        self.expire
    }

    /// Returns when the data becomes stale (should refresh in background).
    #[inline]
    pub fn stale(&self) -> Option<DateTime<Utc>> {
        self.stale
    }

    /// Consumes the cache value and returns the inner data, discarding metadata.
    pub fn into_inner(self) -> T {
        self.data
    }

    /// Consumes the cache value and returns metadata and data separately.
    pub fn into_parts(self) -> (CacheMeta, T) {
        (CacheMeta::new(self.expire, self.stale), self.data)
    }

    /// Calculates the remaining TTL from the expire time, if any.
    ///
    /// Returns `None` when there's no expire time or it has already elapsed.
    pub fn ttl(&self) -> Option<Duration> {
        self.expire.and_then(|expire| {
            let duration = expire.signed_duration_since(Utc::now());
            duration.to_std().ok()
        })
    }

    /// Classifies this value's freshness based on its expire/stale timestamps.
    pub fn cache_state(self) -> CacheState<Self> {
        let now = Utc::now();
        if let Some(expire) = self.expire
            && expire <= now
        {
            CacheState::Expired(self)
        } else if let Some(stale) = self.stale
            && stale <= now
        {
            CacheState::Stale(self)
        } else {
            CacheState::Actual(self)
        }
    }
}

/// Cache expiration metadata without the data.
pub struct CacheMeta {
    /// When the cached data expires and becomes invalid.
    pub expire: Option<DateTime<Utc>>,
    /// When the cached data becomes stale and should be refreshed.
    pub stale: Option<DateTime<Utc>>,
}

impl CacheMeta {
    /// Creates new cache metadata with the given timestamps.
    pub fn new(expire: Option<DateTime<Utc>>, stale: Option<DateTime<Utc>>) -> CacheMeta {
        CacheMeta { expire, stale }
    }
}

impl CacheValue<Raw> {
    /// Estimated in-memory size of this value: struct overhead plus payload bytes.
    pub fn memory_size(&self) -> usize {
        size_of::<Self>() + self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actual_when_no_deadlines() {
        let value = CacheValue::new(1u32, None, None);
        assert!(matches!(value.cache_state(), CacheState::Actual(_)));
    }

    #[test]
    fn expired_takes_priority_over_stale() {
        let past = Utc::now() - chrono::Duration::seconds(1);
        let value = CacheValue::new(1u32, Some(past), Some(past));
        assert!(matches!(value.cache_state(), CacheState::Expired(_)));
    }

    #[test]
    fn stale_without_expiry() {
        let past = Utc::now() - chrono::Duration::seconds(1);
        let future = Utc::now() + chrono::Duration::seconds(60);
        let value = CacheValue::new(1u32, Some(future), Some(past));
        assert!(matches!(value.cache_state(), CacheState::Stale(_)));
    }
}
