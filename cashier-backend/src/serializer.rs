//! Signed serialization envelope for cached values.
//!
//! [`Serializer`] wraps values in a small envelope before they reach a
//! [`Backend`](crate::Backend):
//!
//! - **integer fast path** - `i64` values are stored as 8 raw bytes instead
//!   of going through a general encoder, so counters (`incr`, `slice_incr`)
//!   round-trip without a decode step on the hot path;
//! - **per-type custom codecs** - applications can register a [`Codec`] for
//!   a specific type, overriding the default encoder for just that type;
//! - **everything else** falls back to [`bincode`];
//! - **optional signing** - when a secret is configured, every envelope
//!   carries a digest computed over its contents, and decoding rejects an
//!   envelope whose digest doesn't match. This catches accidental
//!   cross-version or cross-application key collisions, not just malice.
//!
//! ```
//! use cashier_backend::serializer::{Digest, Serializer};
//!
//! let serializer = Serializer::new().with_secret(Digest::Sha256, b"my-secret".to_vec());
//! let envelope = serializer.encode(&42i64).unwrap();
//! let value: i64 = serializer.decode(&envelope).unwrap();
//! assert_eq!(value, 42);
//! ```

use std::any::{Any, TypeId};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use md5::Md5;
use serde::Serialize;
use sha1::Sha1;
use sha2::Sha256;
use thiserror::Error;

use cashier_core::{Cacheable, Raw};

/// Errors from encoding or decoding a serializer envelope.
#[derive(Debug, Error)]
pub enum SerializeError {
    /// The default bincode encoder failed.
    #[error("bincode encode failed: {0}")]
    Encode(String),
    /// The default bincode decoder failed.
    #[error("bincode decode failed: {0}")]
    Decode(String),
    /// A registered [`Codec`] failed to decode its payload.
    #[error("custom codec decode failed: {0}")]
    CodecDecode(String),
    /// The envelope was shorter than its header requires.
    #[error("truncated envelope")]
    Truncated,
    /// The envelope's digest didn't match its signed contents.
    #[error("envelope signature mismatch")]
    SignatureMismatch,
    /// The envelope's version byte isn't one this build understands.
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u8),
}

/// A digest algorithm used to sign or checksum an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Digest {
    /// Plain additive checksum. Catches corruption, not tampering: cheap,
    /// and doesn't require a secret.
    Sum,
    /// HMAC-MD5. Fast, adequate where cryptographic strength isn't required.
    Md5,
    /// HMAC-SHA1.
    Sha1,
    /// HMAC-SHA256. The default when a secret is configured.
    Sha256,
}

impl Digest {
    fn len(self) -> usize {
        match self {
            Digest::Sum => 4,
            Digest::Md5 => 16,
            Digest::Sha1 => 20,
            Digest::Sha256 => 32,
        }
    }

    fn compute(self, secret: &[u8], data: &[u8]) -> Vec<u8> {
        match self {
            Digest::Sum => {
                let sum = data.iter().fold(0u32, |acc, b| acc.wrapping_add(*b as u32));
                sum.to_le_bytes().to_vec()
            }
            Digest::Md5 => {
                let mut mac = <Hmac<Md5> as Mac>::new_from_slice(secret).expect("HMAC accepts any key length");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            Digest::Sha1 => {
                let mut mac = <Hmac<Sha1> as Mac>::new_from_slice(secret).expect("HMAC accepts any key length");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            Digest::Sha256 => {
                let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret).expect("HMAC accepts any key length");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        }
    }
}

const TAG_INT: u8 = 0;
const TAG_CUSTOM: u8 = 1;
const TAG_BINCODE: u8 = 2;
const VERSION: u8 = 1;

/// A per-type encoder/decoder pair, overriding the default bincode fallback.
pub trait Codec<T>: Send + Sync {
    /// Encodes a value to bytes.
    fn encode(&self, value: &T) -> Vec<u8>;
    /// Decodes a value from bytes.
    fn decode(&self, data: &[u8]) -> Result<T, SerializeError>;
}

/// Signs and encodes cached values, with a fast path for integers and a
/// registry of per-type custom codecs.
pub struct Serializer {
    digest: Digest,
    secret: Option<Vec<u8>>,
    codecs: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer {
    /// Creates an unsigned serializer using the default bincode fallback.
    pub fn new() -> Self {
        Serializer {
            digest: Digest::Sha256,
            secret: None,
            codecs: DashMap::new(),
        }
    }

    /// Enables signing: every envelope carries a digest computed with `secret`.
    pub fn with_secret(mut self, digest: Digest, secret: Vec<u8>) -> Self {
        self.digest = digest;
        self.secret = Some(secret);
        self
    }

    /// Registers a custom codec for `T`, overriding the bincode fallback.
    pub fn register_codec<T, C>(&self, codec: C)
    where
        T: 'static,
        C: Codec<T> + 'static,
    {
        let boxed: Arc<dyn Codec<T>> = Arc::new(codec);
        self.codecs.insert(TypeId::of::<T>(), Arc::new(boxed) as Arc<dyn Any + Send + Sync>);
    }

    fn codec_for<T: 'static>(&self) -> Option<Arc<dyn Codec<T>>> {
        self.codecs
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.downcast_ref::<Arc<dyn Codec<T>>>().cloned())
    }

    /// Encodes `value` into a signed envelope.
    pub fn encode<T>(&self, value: &T) -> Result<Raw, SerializeError>
    where
        T: Cacheable + 'static,
    {
        let (tag, payload) = if let Some(int_value) = as_i64(value) {
            (TAG_INT, int_value.to_le_bytes().to_vec())
        } else if let Some(codec) = self.codec_for::<T>() {
            (TAG_CUSTOM, codec.encode(value))
        } else {
            let payload = bincode::serde::encode_to_vec(value, bincode::config::standard())
                .map_err(|e| SerializeError::Encode(e.to_string()))?;
            (TAG_BINCODE, payload)
        };

        let mut envelope = Vec::with_capacity(3 + payload.len() + self.digest.len());
        envelope.push(VERSION);
        envelope.push(if self.secret.is_some() { 1 } else { 0 });
        envelope.push(tag);
        envelope.extend_from_slice(&payload);

        if let Some(secret) = &self.secret {
            let signature = self.digest.compute(secret, &envelope);
            envelope.extend_from_slice(&signature);
        }

        Ok(Bytes::from(envelope))
    }

    /// Decodes a signed envelope back into `T`.
    pub fn decode<T>(&self, envelope: &[u8]) -> Result<T, SerializeError>
    where
        T: Cacheable + 'static,
    {
        if envelope.len() < 3 {
            return Err(SerializeError::Truncated);
        }
        let version = envelope[0];
        if version != VERSION {
            return Err(SerializeError::UnsupportedVersion(version));
        }
        let signed = envelope[1] == 1;
        let tag = envelope[2];

        let (header_and_payload, signature) = if signed {
            let Some(secret) = &self.secret else {
                return Err(SerializeError::SignatureMismatch);
            };
            let sig_len = self.digest.len();
            if envelope.len() < 3 + sig_len {
                return Err(SerializeError::Truncated);
            }
            let split_at = envelope.len() - sig_len;
            let (body, signature) = envelope.split_at(split_at);
            let expected = self.digest.compute(secret, body);
            if expected != signature {
                return Err(SerializeError::SignatureMismatch);
            }
            (body, Some(signature))
        } else {
            (envelope, None)
        };
        let _ = signature;

        let payload = &header_and_payload[3..];

        match tag {
            TAG_INT => {
                if payload.len() != 8 {
                    return Err(SerializeError::Truncated);
                }
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(payload);
                let int_value = i64::from_le_bytes(bytes);
                from_i64::<T>(int_value).ok_or_else(|| {
                    SerializeError::Decode("integer fast path used for a non-integer type".into())
                })
            }
            TAG_CUSTOM => {
                let codec = self
                    .codec_for::<T>()
                    .ok_or_else(|| SerializeError::CodecDecode("no codec registered for type".into()))?;
                codec.decode(payload)
            }
            TAG_BINCODE => {
                let (value, _) = bincode::serde::decode_from_slice(payload, bincode::config::standard())
                    .map_err(|e| SerializeError::Decode(e.to_string()))?;
                Ok(value)
            }
            other => Err(SerializeError::Decode(format!("unknown envelope tag {other}"))),
        }
    }
}

/// Downcasts `T` to `i64` for the integer fast path, with no serialization
/// overhead for any other type.
fn as_i64<T: 'static>(value: &T) -> Option<i64> {
    (value as &dyn Any).downcast_ref::<i64>().copied()
}

fn from_i64<T: 'static>(value: i64) -> Option<T> {
    (Box::new(value) as Box<dyn Any>).downcast::<T>().ok().map(|b| *b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_round_trips_via_fast_path() {
        let serializer = Serializer::new();
        let envelope = serializer.encode(&42i64).unwrap();
        assert_eq!(envelope[2], TAG_INT);
        let value: i64 = serializer.decode(&envelope).unwrap();
        assert_eq!(value, 42);
    }

    #[derive(Debug, Serialize, serde::Deserialize, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn struct_round_trips_via_bincode_fallback() {
        let serializer = Serializer::new();
        let point = Point { x: 1, y: 2 };
        let envelope = serializer.encode(&point).unwrap();
        assert_eq!(envelope[2], TAG_BINCODE);
        let decoded: Point = serializer.decode(&envelope).unwrap();
        assert_eq!(decoded, point);
    }

    #[test]
    fn signed_envelope_round_trips() {
        let serializer = Serializer::new().with_secret(Digest::Sha256, b"secret".to_vec());
        let envelope = serializer.encode(&7i64).unwrap();
        let value: i64 = serializer.decode(&envelope).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn tampered_signed_envelope_is_rejected() {
        let serializer = Serializer::new().with_secret(Digest::Sha256, b"secret".to_vec());
        let mut envelope = serializer.encode(&7i64).unwrap().to_vec();
        let last = envelope.len() - 1;
        envelope[last] ^= 0xFF;
        let result: Result<i64, _> = serializer.decode(&envelope);
        assert!(matches!(result, Err(SerializeError::SignatureMismatch)));
    }

    #[test]
    fn custom_codec_overrides_default() {
        struct UpperCaseCodec;
        impl Codec<String> for UpperCaseCodec {
            fn encode(&self, value: &String) -> Vec<u8> {
                value.to_uppercase().into_bytes()
            }
            fn decode(&self, data: &[u8]) -> Result<String, SerializeError> {
                Ok(String::from_utf8_lossy(data).to_string())
            }
        }

        let serializer = Serializer::new();
        serializer.register_codec::<String, _>(UpperCaseCodec);
        let envelope = serializer.encode(&"hello".to_string()).unwrap();
        assert_eq!(envelope[2], TAG_CUSTOM);
        let decoded: String = serializer.decode(&envelope).unwrap();
        assert_eq!(decoded, "HELLO");
    }
}
