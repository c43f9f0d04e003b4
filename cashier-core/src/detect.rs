//! Cache-detect: opt-in tracking of which keys a scope touched.
//!
//! Wrapping a future in [`detect`] collects a [`DetectEntry`] for every key
//! read or written while that future runs, without changing the future's
//! return value. This powers response headers / log fields that report
//! which cache keys served a given request, without threading an explicit
//! recorder argument through every call site.
//!
//! Detection is opt-in and scoped: code that runs outside a [`detect`] scope
//! calls [`record`] for free, since it's a no-op when no scope is active.

use std::cell::RefCell;
use std::future::Future;

use chrono::{DateTime, Utc};

use crate::command::Command;
use crate::context::CacheStatus;
use crate::key::Key;

/// A single recorded touch of a key during a [`detect`] scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectEntry {
    /// The key that was touched.
    pub key: Key,
    /// The command that touched it.
    pub command: Command,
    /// The outcome of that touch.
    pub status: CacheStatus,
    /// The entry's expiration, if the command produced one.
    pub expire: Option<DateTime<Utc>>,
}

impl DetectEntry {
    /// Builds an entry with no expiration, for commands that don't carry one.
    pub fn new(key: Key, command: Command, status: CacheStatus) -> Self {
        DetectEntry {
            key,
            command,
            status,
            expire: None,
        }
    }

    /// Attaches an expiration timestamp.
    pub fn with_expire(mut self, expire: DateTime<Utc>) -> Self {
        self.expire = Some(expire);
        self
    }
}

tokio::task_local! {
    static ENTRIES: RefCell<Vec<DetectEntry>>;
}

/// Runs `fut` with cache-detect tracking enabled, returning its output
/// alongside every entry recorded while it ran.
///
/// Nested `detect` scopes are independent: entries recorded inside an inner
/// scope are not visible to the outer one once it resumes.
pub async fn detect<F, T>(fut: F) -> (T, Vec<DetectEntry>)
where
    F: Future<Output = T>,
{
    ENTRIES
        .scope(RefCell::new(Vec::new()), async move {
            let output = fut.await;
            let entries = ENTRIES.with(|entries| entries.borrow().clone());
            (output, entries)
        })
        .await
}

/// Records an entry in the active `detect` scope, if there is one.
pub fn record(entry: DetectEntry) {
    let _ = ENTRIES.try_with(|entries| entries.borrow_mut().push(entry));
}

/// True if called from within an active `detect` scope.
pub fn is_active() -> bool {
    ENTRIES.try_with(|_| ()).is_ok()
}
