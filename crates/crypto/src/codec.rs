//! AES-256-GCM sealing of enclave feeds.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key,
};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use tracing::debug;

use tee_types::{Ciphertext, Nonce, NONCE_LEN};

use crate::error::CryptoError;

/// Key length in bytes.
pub const KEY_LEN: usize = 32;

/// Fixed demo key shared by clients and the enclave.
///
/// There is no key provisioning; a deployment would exchange a data key with
/// the enclave out of band.
pub const DEMO_KEY: [u8; KEY_LEN] = [
    0xee, 0xbc, 0x1f, 0x57, 0x48, 0x7f, 0x51, 0x92, 0x1c, 0x04, 0x65, 0x66, 0x5f, 0x8a, 0xe6,
    0xd1, 0x65, 0x8b, 0xb2, 0x6d, 0xe6, 0xf8, 0xa0, 0x69, 0xa3, 0x52, 0x02, 0x93, 0xa5, 0x72,
    0x07, 0x8f,
];

/// Seals and opens values under one fixed key.
#[derive(Clone)]
pub struct Codec {
    cipher: Aes256Gcm,
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec").finish_non_exhaustive()
    }
}

impl Codec {
    /// Create a codec from a 32-byte key.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKey(key.len()))?;
        Ok(Self { cipher })
    }

    /// Codec over [`DEMO_KEY`].
    pub fn demo() -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&DEMO_KEY)),
        }
    }

    /// Seal `plaintext` under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Ciphertext, CryptoError> {
        self.encrypt_with_rng(plaintext, &mut OsRng)
    }

    /// Seal `plaintext` under a nonce drawn from `rng`.
    pub fn encrypt_with_rng<R: RngCore + CryptoRng>(
        &self,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<Ciphertext, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce);
        self.seal_with_nonce(plaintext, &nonce)
    }

    /// Seal `plaintext` under a caller-supplied nonce.
    ///
    /// Deterministic for a given nonce. Reusing a nonce under the same key
    /// breaks confidentiality, so callers must supply fresh ones.
    pub fn seal_with_nonce(
        &self,
        plaintext: &[u8],
        nonce: &Nonce,
    ) -> Result<Ciphertext, CryptoError> {
        let content = self
            .cipher
            .encrypt(aes_gcm::Nonce::from_slice(nonce), plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(format!("AES-GCM seal failed: {}", e)))?;
        debug!(ciphertext_len = content.len(), "sealed value");
        Ok(Ciphertext::new(content, *nonce))
    }

    /// Open a sealed value.
    pub fn decrypt(&self, ciphertext: &Ciphertext) -> Result<Vec<u8>, CryptoError> {
        self.open(&ciphertext.content, &ciphertext.nonce)
    }

    /// Open raw ciphertext bytes with a raw nonce of any length.
    pub fn open(&self, content: &[u8], nonce: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce: &Nonce = nonce.try_into().map_err(|_| {
            CryptoError::DecryptionFailed(format!(
                "nonce must be {} bytes, got {}",
                NONCE_LEN,
                nonce.len()
            ))
        })?;
        self.cipher
            .decrypt(aes_gcm::Nonce::from_slice(nonce), content)
            .map_err(|_| CryptoError::DecryptionFailed("authentication failed".into()))
    }

    /// Seal a 32-bit amount.
    pub fn encrypt_amount(&self, amount: u32) -> Result<Ciphertext, CryptoError> {
        self.encrypt(&encode_amount(amount))
    }

    /// Open a sealed 32-bit amount.
    pub fn decrypt_amount(&self, ciphertext: &Ciphertext) -> Result<u32, CryptoError> {
        decode_amount(&self.decrypt(ciphertext)?)
    }
}

/// Big-endian encoding of an amount.
pub fn encode_amount(amount: u32) -> [u8; 4] {
    amount.to_be_bytes()
}

/// Decode a big-endian amount.
pub fn decode_amount(bytes: &[u8]) -> Result<u32, CryptoError> {
    let bytes: [u8; 4] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidAmount(bytes.len()))?;
    Ok(u32::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let codec = Codec::demo();
        let cases: [&[u8]; 4] = [b"", b"40", &[0u8; 4], &[0xffu8; 64]];
        for plaintext in cases {
            let sealed = codec.encrypt(plaintext).unwrap();
            assert_eq!(codec.decrypt(&sealed).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_encrypt_is_not_deterministic() {
        let codec = Codec::demo();
        let a = codec.encrypt(b"same").unwrap();
        let b = codec.encrypt(b"same").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.content, b.content);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let codec = Codec::demo();
        let mut sealed = codec.encrypt(b"secret").unwrap();
        sealed.content[0] ^= 0x01;
        assert!(matches!(
            codec.decrypt(&sealed),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = Codec::demo().encrypt(b"secret").unwrap();
        let other = Codec::new(&[0x11u8; KEY_LEN]).unwrap();
        assert!(matches!(
            other.decrypt(&sealed),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_bad_nonce_length_fails() {
        let codec = Codec::demo();
        let sealed = codec.encrypt(b"secret").unwrap();
        let result = codec.open(&sealed.content, &sealed.nonce[..8]);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn test_invalid_key_length() {
        assert_eq!(
            Codec::new(&[0u8; 16]).unwrap_err(),
            CryptoError::InvalidKey(16)
        );
    }

    #[test]
    fn test_seal_with_nonce_is_deterministic() {
        let codec = Codec::demo();
        let nonce = [9u8; NONCE_LEN];
        let a = codec.seal_with_nonce(b"balance", &nonce).unwrap();
        let b = codec.seal_with_nonce(b"balance", &nonce).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_amount_is_big_endian() {
        assert_eq!(encode_amount(0x0102_0304), [1, 2, 3, 4]);
        assert_eq!(decode_amount(&[0, 0, 0, 100]).unwrap(), 100);
        assert_eq!(decode_amount(&[1, 2, 3]), Err(CryptoError::InvalidAmount(3)));

        let codec = Codec::demo();
        let sealed = codec.encrypt_amount(100).unwrap();
        assert_eq!(codec.decrypt_amount(&sealed).unwrap(), 100);
    }
}
