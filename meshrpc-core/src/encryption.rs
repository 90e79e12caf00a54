//! Encryption stage of the link layer (spec §4.3), grounded on the AES-GCM
//! use in the original `transport/security.go`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes192;
use aes_gcm::{AesGcm, Aes128Gcm, Aes256Gcm, Nonce};
use bytes::Bytes;
use rand::RngCore;

use crate::error::{Error, Result};

const NONCE_LEN: usize = 12;

/// AES-192-GCM has no convenience alias in `aes_gcm` (only 128/256 do);
/// built the same way those two are, over the `aes` crate's `Aes192`.
type Aes192Gcm = AesGcm<Aes192, aes_gcm::aead::consts::U12>;

pub trait Encryptor: Send + Sync {
    fn encrypt(&self, data: &[u8]) -> Result<Bytes>;
    fn decrypt(&self, data: &[u8]) -> Result<Bytes>;
}

/// AES-GCM with a random 12-byte nonce prepended to the ciphertext.
/// 16-byte keys select AES-128-GCM, 24-byte keys select AES-192-GCM,
/// 32-byte keys select AES-256-GCM; any other length is rejected at
/// construction.
pub enum AesGcmEncryptor {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

impl AesGcmEncryptor {
    pub fn new(key: &[u8]) -> Result<Self> {
        match key.len() {
            16 => Ok(AesGcmEncryptor::Aes128(
                Aes128Gcm::new_from_slice(key)
                    .map_err(|e| Error::LinkFailure(e.to_string()))?,
            )),
            24 => Ok(AesGcmEncryptor::Aes192(
                Aes192Gcm::new_from_slice(key)
                    .map_err(|e| Error::LinkFailure(e.to_string()))?,
            )),
            32 => Ok(AesGcmEncryptor::Aes256(
                Aes256Gcm::new_from_slice(key)
                    .map_err(|e| Error::LinkFailure(e.to_string()))?,
            )),
            other => Err(Error::LinkFailure(format!(
                "invalid AES-GCM key length {other}, expected 16, 24, or 32 bytes"
            ))),
        }
    }
}

impl Encryptor for AesGcmEncryptor {
    fn encrypt(&self, data: &[u8]) -> Result<Bytes> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = match self {
            AesGcmEncryptor::Aes128(cipher) => cipher.encrypt(nonce, data),
            AesGcmEncryptor::Aes192(cipher) => cipher.encrypt(nonce, data),
            AesGcmEncryptor::Aes256(cipher) => cipher.encrypt(nonce, data),
        }
        .map_err(|e| Error::LinkFailure(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(Bytes::from(out))
    }

    fn decrypt(&self, data: &[u8]) -> Result<Bytes> {
        if data.len() < NONCE_LEN {
            return Err(Error::LinkFailure("ciphertext shorter than nonce".into()));
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = match self {
            AesGcmEncryptor::Aes128(cipher) => cipher.decrypt(nonce, ciphertext),
            AesGcmEncryptor::Aes192(cipher) => cipher.decrypt(nonce, ciphertext),
            AesGcmEncryptor::Aes256(cipher) => cipher.decrypt(nonce, ciphertext),
        }
        .map_err(|e| Error::LinkFailure(e.to_string()))?;

        Ok(Bytes::from(plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes128_round_trip() {
        let enc = AesGcmEncryptor::new(&[1u8; 16]).unwrap();
        let ct = enc.encrypt(b"secret payload").unwrap();
        let pt = enc.decrypt(&ct).unwrap();
        assert_eq!(pt.as_ref(), b"secret payload");
    }

    #[test]
    fn aes192_round_trip() {
        let enc = AesGcmEncryptor::new(&[5u8; 24]).unwrap();
        let ct = enc.encrypt(b"middle key size").unwrap();
        let pt = enc.decrypt(&ct).unwrap();
        assert_eq!(pt.as_ref(), b"middle key size");
    }

    #[test]
    fn aes256_round_trip() {
        let enc = AesGcmEncryptor::new(&[2u8; 32]).unwrap();
        let ct = enc.encrypt(b"another secret").unwrap();
        let pt = enc.decrypt(&ct).unwrap();
        assert_eq!(pt.as_ref(), b"another secret");
    }

    #[test]
    fn rejects_bad_key_length() {
        let err = AesGcmEncryptor::new(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, Error::LinkFailure(_)));
    }

    #[test]
    fn nonce_is_randomized_per_call() {
        let enc = AesGcmEncryptor::new(&[3u8; 16]).unwrap();
        let a = enc.encrypt(b"same plaintext").unwrap();
        let b = enc.encrypt(b"same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let enc = AesGcmEncryptor::new(&[4u8; 16]).unwrap();
        let mut ct = enc.encrypt(b"integrity matters").unwrap().to_vec();
        let last = ct.len() - 1;
        ct[last] ^= 0xff;
        let err = enc.decrypt(&ct).unwrap_err();
        assert!(matches!(err, Error::LinkFailure(_)));
    }
}
