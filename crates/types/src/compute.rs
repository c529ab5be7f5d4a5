//! Compute task and result types exchanged with the confidential-compute service.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use crate::{Ciphertext, Nonce};

/// Operation selector for the pairwise comparison used by auction settlement.
pub const OP_COMPARE: &str = "compare";

/// Operation selector for the encrypted balance update.
pub const OP_PAYMENT: &str = "paymentCCtee";

/// Plaintext returned by `compare` when the first feed is strictly larger.
pub const COMPARE_GREATER: &[u8] = b"1";

/// Plaintext returned by `compare` when both feeds are equal.
pub const COMPARE_EQUAL: &[u8] = b"0";

/// Plaintext returned by `compare` when the first feed is strictly smaller.
pub const COMPARE_LESS: &[u8] = b"-1";

/// A unit of work for the enclave.
///
/// Feeds are opened inside the enclave; output nonces are used to re-seal
/// results so the caller controls nonce freshness.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComputeTask {
    pub operation: String,
    #[serde_as(as = "Vec<Hex>")]
    pub plaintext_inputs: Vec<Vec<u8>>,
    pub feeds: Vec<Ciphertext>,
    #[serde_as(as = "Vec<Hex>")]
    pub output_nonces: Vec<Nonce>,
}

impl ComputeTask {
    /// Create a task with no plaintext inputs and no output nonces.
    pub fn new(operation: impl Into<String>, feeds: Vec<Ciphertext>) -> Self {
        Self {
            operation: operation.into(),
            plaintext_inputs: Vec::new(),
            feeds,
            output_nonces: Vec::new(),
        }
    }

    /// Attach output nonces for re-sealed results.
    pub fn with_output_nonces(mut self, nonces: impl IntoIterator<Item = Nonce>) -> Self {
        self.output_nonces = nonces.into_iter().collect();
        self
    }
}

/// What the enclave hands back for a [`ComputeTask`].
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComputeResult {
    #[serde_as(as = "Vec<Hex>")]
    pub plaintexts: Vec<Vec<u8>>,
    pub reencrypted_feeds: Vec<Ciphertext>,
}

/// Outcome of a `compare` operation, challenger relative to the incumbent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Greater,
    Equal,
    Less,
}

impl Comparison {
    /// Interpret the single plaintext byte string returned by `compare`.
    ///
    /// Anything other than `"1"` or `"0"` counts as `Less`.
    pub fn from_plaintext(plaintext: &[u8]) -> Self {
        match plaintext {
            COMPARE_GREATER => Comparison::Greater,
            COMPARE_EQUAL => Comparison::Equal,
            _ => Comparison::Less,
        }
    }

    /// Plaintext encoding of this outcome.
    pub fn as_plaintext(self) -> &'static [u8] {
        match self {
            Comparison::Greater => COMPARE_GREATER,
            Comparison::Equal => COMPARE_EQUAL,
            Comparison::Less => COMPARE_LESS,
        }
    }
}
