//! Transfer compression of processed content.
//!
//! Compression happens after versioning: the version token only ever covers
//! the processed text, so every encoding of one build shares it.

mod negotiate;

pub use negotiate::{AcceptEncoding, negotiate};

use flate2::Compression;
use flate2::write::{DeflateEncoder, GzEncoder};
use serde::{Deserialize, Serialize};
use std::io::Write;
use thiserror::Error;

/// Content-Encoding of a served artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Identity,
    Gzip,
    Deflate,
}

impl Encoding {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CompressError {
    #[error("{encoding} compression failed: {source}")]
    Io {
        encoding: Encoding,
        #[source]
        source: std::io::Error,
    },
}

/// One content encoding the engine can produce.
pub trait Compressor: Send + Sync {
    fn encoding(&self) -> Encoding;

    /// Whether the client's Accept-Encoding admits this encoding.
    fn can_handle(&self, accept_encoding: &str) -> bool {
        AcceptEncoding::parse(accept_encoding).quality(self.encoding()) > 0.0
    }

    fn compress(&self, content: &[u8]) -> Result<Vec<u8>, CompressError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCompressor;

impl Compressor for IdentityCompressor {
    fn encoding(&self) -> Encoding {
        Encoding::Identity
    }

    fn can_handle(&self, _accept_encoding: &str) -> bool {
        true
    }

    fn compress(&self, content: &[u8]) -> Result<Vec<u8>, CompressError> {
        Ok(content.to_vec())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    pub level: u32,
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl Compressor for GzipCompressor {
    fn encoding(&self) -> Encoding {
        Encoding::Gzip
    }

    fn compress(&self, content: &[u8]) -> Result<Vec<u8>, CompressError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));
        encoder
            .write_all(content)
            .and_then(|_| encoder.finish())
            .map_err(|source| CompressError::Io {
                encoding: Encoding::Gzip,
                source,
            })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DeflateCompressor {
    pub level: u32,
}

impl Default for DeflateCompressor {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl Compressor for DeflateCompressor {
    fn encoding(&self) -> Encoding {
        Encoding::Deflate
    }

    fn compress(&self, content: &[u8]) -> Result<Vec<u8>, CompressError> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(self.level));
        encoder
            .write_all(content)
            .and_then(|_| encoder.finish())
            .map_err(|source| CompressError::Io {
                encoding: Encoding::Deflate,
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::{DeflateDecoder, GzDecoder};
    use std::io::Read;

    const BODY: &[u8] = b"var a=1;var b=2;var a=1;var b=2;var a=1;var b=2;";

    #[test]
    fn test_gzip_compress() {
        let compressed = GzipCompressor::default().compress(BODY).unwrap();
        assert_ne!(compressed, BODY);

        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, BODY);
    }

    #[test]
    fn test_deflate_compress() {
        let compressed = DeflateCompressor::default().compress(BODY).unwrap();
        let mut decoded = Vec::new();
        DeflateDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, BODY);
    }

    #[test]
    fn test_gzip_is_deterministic() {
        let gzip = GzipCompressor::default();
        assert_eq!(gzip.compress(BODY).unwrap(), gzip.compress(BODY).unwrap());
    }

    #[test]
    fn test_can_handle() {
        let gzip = GzipCompressor::default();
        assert!(gzip.can_handle("gzip, deflate"));
        assert!(gzip.can_handle("*"));
        assert!(!gzip.can_handle("gzip;q=0, deflate"));
        assert!(!gzip.can_handle("deflate"));
        assert!(!gzip.can_handle(""));
        assert!(IdentityCompressor.can_handle(""));
    }
}
