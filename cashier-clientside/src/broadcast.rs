//! The broadcast-subscription contract a remote backend optionally
//! implements, so [`crate::ClientSideBackend`] stays generic over any
//! wire client rather than depending on a concrete one.

use cashier_core::Key;
use tokio::sync::broadcast;

/// A single invalidation notification from the remote store.
#[derive(Debug, Clone)]
pub enum Invalidate {
    /// These fully-prefixed keys changed or were removed upstream.
    Keys(Vec<Key>),
    /// The subscription can't name individual keys; discard the whole local mirror.
    Flush,
}

/// Capability a remote backend implements to let [`crate::ClientSideBackend`]
/// keep its local mirror coherent.
///
/// A real Redis-backed implementation would issue `CLIENT TRACKING on
/// REDIRECT <id> BCAST PREFIX <prefix>` and translate pushed invalidation
/// messages into [`Invalidate`] values; that wire client is out of scope
/// here, this trait is the seam it would plug into.
pub trait BroadcastSource: Send + Sync {
    /// Subscribes to this store's invalidation channel. Each call opens an
    /// independent subscription; messages published before a given
    /// subscription call are not replayed to it.
    fn subscribe(&self) -> broadcast::Receiver<Invalidate>;
}
