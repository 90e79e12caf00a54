//! Compression stage of the link layer (spec §4.3).

use std::io::{Read, Write};

use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

pub trait Compressor: Send + Sync {
    fn name(&self) -> &'static str;
    fn compress(&self, data: &[u8]) -> Result<Bytes>;
    fn decompress(&self, data: &[u8]) -> Result<Bytes>;
}

/// Pass-through compressor used when a peer negotiates no compression.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityCompressor;

impl Compressor for IdentityCompressor {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn compress(&self, data: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }

    fn decompress(&self, data: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress(&self, data: &[u8]) -> Result<Bytes> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(data)
            .map_err(|e| Error::LinkFailure(e.to_string()))?;
        let out = encoder
            .finish()
            .map_err(|e| Error::LinkFailure(e.to_string()))?;
        Ok(Bytes::from(out))
    }

    fn decompress(&self, data: &[u8]) -> Result<Bytes> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::LinkFailure(e.to_string()))?;
        Ok(Bytes::from(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_noop() {
        let c = IdentityCompressor;
        let data = b"hello";
        assert_eq!(c.compress(data).unwrap(), Bytes::copy_from_slice(data));
    }

    #[test]
    fn gzip_round_trip() {
        let c = GzipCompressor;
        let data = b"hello world, compress me please".repeat(8);
        let compressed = c.compress(&data).unwrap();
        let decompressed = c.decompress(&compressed).unwrap();
        assert_eq!(decompressed.as_ref(), data.as_slice());
    }

    #[test]
    fn gzip_bad_input_is_link_failure() {
        let c = GzipCompressor;
        let err = c.decompress(b"not gzip data").unwrap_err();
        assert!(matches!(err, Error::LinkFailure(_)));
    }
}
