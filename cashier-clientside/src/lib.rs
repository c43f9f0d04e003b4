//! Client-side hybrid cache backend for the cashier caching framework.
//!
//! [`ClientSideBackend`] mirrors a remote [`cashier_backend::Backend`] into a
//! local one, read-through on miss and write-through on every mutation, kept
//! coherent by the remote store's broadcast invalidation channel
//! ([`BroadcastSource`]). It has no wire client of its own — the remote
//! backend and its broadcast subscription are both contracts, so this crate
//! stays generic over whatever store implements them.
#![warn(missing_docs)]

mod backend;
mod builder;
pub mod broadcast;

pub use backend::{ClientSideBackend, DEFAULT_RECONNECT_WAIT};
pub use broadcast::{BroadcastSource, Invalidate};
pub use builder::ClientSideBackendBuilder;
