//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors that can occur while sealing or opening values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKey(usize),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid amount encoding: expected 4 bytes, got {0}")]
    InvalidAmount(usize),
}
