//! Authenticated symmetric encryption for enclave feeds.
//!
//! Values handed to the confidential-compute service are sealed with
//! AES-256-GCM under a shared 256-bit key:
//!
//! 1. **Seal**: a fresh 12-byte nonce is drawn from the OS CSPRNG and the
//!    plaintext is sealed with no associated data. Sealing the same plaintext
//!    twice yields different ciphertexts.
//! 2. **Open**: authentication failure or a malformed nonce is reported as
//!    [`CryptoError::DecryptionFailed`], never as a panic.
//! 3. **Amounts**: 32-bit unsigned amounts are big-endian encoded before
//!    sealing.
//!
//! The enclave re-seals its outputs with caller-supplied nonces; see
//! [`Codec::seal_with_nonce`].

pub mod codec;
pub mod error;

pub use codec::{decode_amount, encode_amount, Codec, DEMO_KEY, KEY_LEN};
pub use error::CryptoError;
