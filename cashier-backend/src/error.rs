//! Error types for backend operations.

use crate::compressor::CompressionError;
use crate::serializer::SerializeError;
use thiserror::Error;

/// Error type for backend operations.
///
/// This enum categorizes errors that can occur during cache backend interactions
/// into distinct groups for appropriate handling.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Internal backend error, state or computation error.
    ///
    /// Any error not related to network interaction.
    #[error(transparent)]
    InternalError(Box<dyn std::error::Error + Send>),

    /// Network interaction error.
    ///
    /// Errors occurring during communication with remote backends (e.g., Redis).
    #[error(transparent)]
    ConnectionError(Box<dyn std::error::Error + Send>),

    /// Serialization or deserialization error.
    #[error(transparent)]
    SerializeError(#[from] SerializeError),

    /// Compression or decompression error.
    #[error(transparent)]
    CompressionError(#[from] CompressionError),

    /// The key is locked by another caller; this operation requires the lock.
    #[error("key is locked")]
    Locked,

    /// The backend doesn't implement this operation.
    #[error("operation not supported by this backend: {0}")]
    NotSupported(&'static str),

    /// The operation didn't complete within its deadline.
    #[error("operation timed out")]
    Timeout,
}

impl BackendError {
    /// Wraps an arbitrary error as an [`BackendError::InternalError`].
    pub fn internal(error: impl std::error::Error + Send + 'static) -> Self {
        BackendError::InternalError(Box::new(error))
    }

    /// Wraps an arbitrary error as a [`BackendError::ConnectionError`].
    pub fn connection(error: impl std::error::Error + Send + 'static) -> Self {
        BackendError::ConnectionError(Box::new(error))
    }
}
