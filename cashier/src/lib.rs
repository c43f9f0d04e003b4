//! Asynchronous cache facade: prefix-based backend routing, a default
//! middleware chain, decorator caching strategies, and tag-based
//! invalidation, built on top of [`cashier_backend::Backend`].
//!
//! - [`facade`] - [`Facade`]/[`FacadeBuilder`], prefix routing to one
//!   backend per key and multi-key fan-out across however many backends a
//!   batch call touches.
//! - [`middleware`] - the [`Middleware`] trait and the default wrappers
//!   every registered backend gets: disable-control/invalidate-further
//!   ([`middleware::Guarded`]) and lazy one-time setup ([`middleware::AutoInit`]).
//! - [`decorators`] - the caching strategies (`simple`, `early`, `hit`,
//!   `soft`, `failover`, `locked`, `thunder`, `iterator`, `circuit_breaker`,
//!   `rate_limit`, `bloom`) layered on top of a [`Facade`].
//! - [`tags`] - [`tags::TagRegistry`] for tag-based bulk invalidation and
//!   [`tags::TagPruner`] for keeping tag membership in sync with evictions.
//! - [`context`] - task-local cache-control flags that propagate independent
//!   of any call's explicit arguments.
//! - [`offload`] - background task tracking for decorators that recompute
//!   off the request path (`early`, `hit`).
//! - [`error`] - [`CacheError`], unifying backend failures with the
//!   facade's own policy-level signals.
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod context;
pub mod decorators;
pub mod error;
pub mod facade;
pub(crate) mod metrics;
pub mod middleware;
pub mod offload;
pub mod tags;

pub use error::CacheError;
pub use facade::{Facade, FacadeBuilder};
pub use middleware::{AutoInit, Guarded, Middleware};
pub use tags::{TagPruner, TagRegistry};

pub use cashier_backend::{Backend, BackendError, Serializer, SyncBackend};
pub use cashier_core::{Cacheable, Key, Raw};
