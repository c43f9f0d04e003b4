//! Serialization trait for cached values.
//!
//! This module provides the [`Cacheable`] trait which defines the serialization
//! requirements for types that can be stored in cache backends.
//!
//! The trait has a blanket implementation for all types that satisfy the
//! bounds, so manual implementations are never needed: derive `Serialize` and
//! `Deserialize` on an application type and it becomes `Cacheable` for free.

use serde::{Serialize, de::DeserializeOwned};

/// Marker trait for types that can be cached.
///
/// Blanket-implemented for any `T: Serialize + DeserializeOwned + Send + Sync`.
pub trait Cacheable: Serialize + DeserializeOwned + Send + Sync {}

impl<T> Cacheable for T where T: Serialize + DeserializeOwned + Send + Sync {}
