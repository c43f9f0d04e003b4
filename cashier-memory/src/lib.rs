//! In-memory backend for the cashier caching framework.
//!
//! [`MemoryBackend`] implements the full [`cashier_backend::Backend`] contract
//! over a process-local [`dashmap::DashMap`], with lazy TTL expiry on read
//! plus an optional background sweep. It has no persistence and no
//! cross-process sharing; use a networked backend for that.
#![warn(missing_docs)]

mod backend;
mod builder;
pub mod metrics;

pub use backend::MemoryBackend;
pub use builder::MemoryBackendBuilder;
