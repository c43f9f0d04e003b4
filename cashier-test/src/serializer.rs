//! Fixed-secret [`Serializer`] constructors for tests that need a signed
//! envelope without generating or managing their own key material.

use cashier_backend::serializer::{Digest, Serializer};

const TEST_SECRET: &[u8] = b"cashier-test-fixed-secret";

/// An unsigned serializer, equivalent to [`Serializer::new`].
pub fn unsigned_serializer() -> Serializer {
    Serializer::new()
}

/// A serializer signing every envelope with a fixed test secret under `digest`.
pub fn signed_serializer(digest: Digest) -> Serializer {
    Serializer::new().with_secret(digest, TEST_SECRET.to_vec())
}
