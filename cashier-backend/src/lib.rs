//! Backend trait and serialization envelope for the cashier caching framework.
//!
//! - [`backend`] - the [`Backend`] trait: the full operation contract every
//!   cache store implements.
//! - [`serializer`] - the signed envelope wrapping typed values into [`Raw`]
//!   bytes before they reach a backend.
//! - [`compressor`] - the pluggable (trivial by default) compression seam.
//! - [`error`] - [`BackendError`], unifying failures from all of the above.
#![warn(missing_docs)]

pub mod backend;
pub mod compressor;
pub mod error;
pub(crate) mod metrics;
pub mod serializer;

pub use backend::{
    Backend, BackendResult, DeleteStatus, Expiry, Instrumented, LockGuard, RemoveCallback, SetCondition,
    SyncBackend, UnsyncBackend, lock,
};
pub use compressor::{CompressionError, Compressor, PassthroughCompressor};
pub use error::BackendError;
pub use serializer::{Codec, Digest, SerializeError, Serializer};

pub use cashier_core::Raw;
