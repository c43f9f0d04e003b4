//! Pluggable compression for serialized cache values.
//!
//! Compression is intentionally a trivial seam: [`Compressor`] has exactly
//! two methods, and the default [`PassthroughCompressor`] does nothing.
//! Picking an actual codec (gzip, zstd, ...) is left to applications that
//! need it.

use thiserror::Error;

/// Errors from compression or decompression.
#[derive(Debug, Error)]
pub enum CompressionError {
    /// Compression failed.
    #[error("compression failed: {0}")]
    Compress(String),
    /// Decompression failed.
    #[error("decompression failed: {0}")]
    Decompress(String),
}

/// Compresses and decompresses serialized cache values.
pub trait Compressor: std::fmt::Debug + Send + Sync {
    /// Compresses `data`, returning the compressed bytes.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError>;

    /// Decompresses `data`, returning the original bytes.
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError>;
}

/// A no-op compressor: returns its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCompressor;

impl Compressor for PassthroughCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        Ok(data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_round_trips() {
        let compressor = PassthroughCompressor;
        let data = b"hello world".to_vec();
        let compressed = compressor.compress(&data).unwrap();
        assert_eq!(compressed, data);
        let decompressed = compressor.decompress(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }
}
