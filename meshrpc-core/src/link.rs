//! Link layer: combines an optional [`Compressor`] and optional
//! [`Encryptor`] into one outbound/inbound transform pair, applied to
//! already-encoded frame bytes (spec §4.3).
//!
//! Outbound order is compress-then-encrypt; inbound is the mirror,
//! decrypt-then-decompress. Both stages are independently optional: a
//! `LinkLayer` with neither configured is a no-op pass-through.

use std::sync::Arc;

use bytes::Bytes;

use crate::compression::Compressor;
use crate::encryption::Encryptor;
use crate::error::Result;

pub type BoxedCompressor = Arc<dyn Compressor>;
pub type BoxedEncryptor = Arc<dyn Encryptor>;

#[derive(Clone, Default)]
pub struct LinkLayer {
    compressor: Option<BoxedCompressor>,
    encryptor: Option<BoxedEncryptor>,
}

impl LinkLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compressor(mut self, compressor: BoxedCompressor) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn with_encryptor(mut self, encryptor: BoxedEncryptor) -> Self {
        self.encryptor = Some(encryptor);
        self
    }

    /// Apply the outbound transform: compress, then encrypt.
    pub fn apply(&self, data: &[u8]) -> Result<Bytes> {
        let compressed = match &self.compressor {
            Some(c) => c.compress(data)?,
            None => Bytes::copy_from_slice(data),
        };
        match &self.encryptor {
            Some(e) => e.encrypt(&compressed),
            None => Ok(compressed),
        }
    }

    /// Invert the outbound transform: decrypt, then decompress.
    pub fn invert(&self, data: &[u8]) -> Result<Bytes> {
        let decrypted = match &self.encryptor {
            Some(e) => e.decrypt(data)?,
            None => Bytes::copy_from_slice(data),
        };
        match &self.compressor {
            Some(c) => c.decompress(&decrypted),
            None => Ok(decrypted),
        }
    }
}
