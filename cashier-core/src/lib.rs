//! Shared types for the cashier caching framework.
//!
//! This crate holds the types that flow between a cache facade, its
//! middleware chain, and its backends: cache keys and key templates
//! ([`key`]), cached values and their freshness ([`value`]), the
//! serialization marker trait ([`cacheable`]), human TTL parsing ([`ttl`]),
//! the closed command set ([`command`]), and two task-scoped instrumentation
//! facilities, cache-detect ([`detect`]) and disable-control ([`disable`]).
#![warn(missing_docs)]

pub mod cacheable;
pub mod command;
pub mod context;
pub mod detect;
pub mod disable;
pub mod key;
pub mod label;
pub mod offload;
pub mod ttl;
pub mod value;

pub use cacheable::Cacheable;
pub use command::Command;
pub use context::CacheStatus;
pub use detect::{DetectEntry, detect};
pub use disable::{disabling, is_disabled};
pub use key::{Key, KeyTemplate, TemplateError, ValueFormatter, register_formatter};
pub use label::BackendLabel;
pub use offload::Offload;
pub use ttl::{Ttl, TtlParseError, parse_human_duration};
pub use value::{CacheMeta, CacheState, CacheValue};

#[doc(hidden)]
pub use smol_str::SmolStr;

/// Raw byte data type used for serialized cache values.
/// Using `Bytes` provides efficient zero-copy cloning via reference counting.
pub type Raw = bytes::Bytes;
