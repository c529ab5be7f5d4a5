//! Core type definitions for enclave-backed auctions and payments.
//!
//! Every record that reaches the ledger has an explicit schema here. Decoding
//! is strict: unknown fields are rejected, required fields must be present and
//! nonces must be exactly 12 bytes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use thiserror::Error;

pub mod compute;

pub use compute::{ComputeResult, ComputeTask, Comparison};

// =========================
// CRYPTOGRAPHIC PRIMITIVES
// =========================

/// Length of an AES-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM nonce.
pub type Nonce = [u8; NONCE_LEN];

/// One AES-256-GCM sealed value (ciphertext with appended tag) and its nonce.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Ciphertext {
    #[serde_as(as = "Hex")]
    pub content: Vec<u8>,
    #[serde_as(as = "Hex")]
    pub nonce: Nonce,
}

impl Ciphertext {
    pub fn new(content: Vec<u8>, nonce: Nonce) -> Self {
        Self { content, nonce }
    }

    /// Build from raw parts, checking the nonce length.
    pub fn from_parts(content: Vec<u8>, nonce: &[u8]) -> Result<Self, SchemaError> {
        let nonce: Nonce = nonce.try_into().map_err(|_| SchemaError::InvalidField {
            field: "nonce",
            reason: format!("expected {} bytes, got {}", NONCE_LEN, nonce.len()),
        })?;
        Ok(Self { content, nonce })
    }
}

// =========================
// AUCTION TYPES
// =========================

/// Where an auction is relative to a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuctionPhase {
    /// Before `start`
    Pending,
    /// Within `[start, end]`, accepting bids
    Open,
    /// After `end`
    Closed,
}

/// Public auction record, stored in world state under its id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Auction {
    pub id: String,
    /// Winning bid id; empty means no winner (tie) once `ended` is set.
    pub winner: String,
    /// Ciphertext of the retained winning bid, set by `end`.
    pub value: Option<Ciphertext>,
    /// Public reserve supplied at creation.
    pub starting_bid: u64,
    /// Unix seconds, inclusive.
    pub start: u64,
    /// Unix seconds, inclusive.
    pub end: u64,
    /// Bid ids in submission order.
    pub bids: Vec<String>,
    /// Whether a fold has completed.
    pub ended: bool,
}

impl Auction {
    pub fn new(id: String, start: u64, end: u64, starting_bid: u64) -> Self {
        Self {
            id,
            winner: String::new(),
            value: None,
            starting_bid,
            start,
            end,
            bids: Vec::new(),
            ended: false,
        }
    }

    pub fn phase(&self, now: u64) -> AuctionPhase {
        if now < self.start {
            AuctionPhase::Pending
        } else if now > self.end {
            AuctionPhase::Closed
        } else {
            AuctionPhase::Open
        }
    }
}

/// Sealed bid, stored in the auction private collection under its id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Bid {
    pub id: String,
    pub cert: String,
    pub value: Ciphertext,
}

// =========================
// PAYMENT TYPES
// =========================

/// Encrypted account, stored in the payment private collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Account {
    pub balance: Ciphertext,
}

/// Payload of the payment `create` invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateAccountRequest {
    /// Must be empty; accounts are funded out of nothing.
    #[serde(default)]
    pub from: String,
    pub to: String,
    pub balance: Ciphertext,
}

/// Payload of the payment `transfer` invocation. Never persisted.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub amount: Ciphertext,
    /// Encrypted enclave program that performs the update.
    pub program: Ciphertext,
    /// Fresh nonces for the re-sealed `from` and `to` balances.
    #[serde_as(as = "[Hex; 2]")]
    pub output_nonces: [Nonce; 2],
}

// =========================
// SCHEMA HELPERS
// =========================

/// Errors decoding or encoding a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("malformed {schema}: {source}")]
    Malformed {
        schema: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("encode {schema}: {source}")]
    Encode {
        schema: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A record with a fixed JSON schema.
pub trait Schema: Serialize + DeserializeOwned {
    const NAME: &'static str;

    fn decode(bytes: &[u8]) -> Result<Self, SchemaError> {
        serde_json::from_slice(bytes).map_err(|source| SchemaError::Malformed {
            schema: Self::NAME,
            source,
        })
    }

    fn encode(&self) -> Result<Vec<u8>, SchemaError> {
        serde_json::to_vec(self).map_err(|source| SchemaError::Encode {
            schema: Self::NAME,
            source,
        })
    }
}

impl Schema for Ciphertext {
    const NAME: &'static str = "ciphertext";
}

impl Schema for Auction {
    const NAME: &'static str = "auction";
}

impl Schema for Bid {
    const NAME: &'static str = "bid";
}

impl Schema for Account {
    const NAME: &'static str = "account";
}

impl Schema for CreateAccountRequest {
    const NAME: &'static str = "create account request";
}

impl Schema for TransferRequest {
    const NAME: &'static str = "transfer request";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ciphertext() -> Ciphertext {
        Ciphertext::new(vec![1, 2, 3, 4], [7u8; 12])
    }

    #[test]
    fn test_auction_phase() {
        let auction = Auction::new("a".into(), 100, 200, 5);
        assert_eq!(auction.phase(99), AuctionPhase::Pending);
        assert_eq!(auction.phase(100), AuctionPhase::Open);
        assert_eq!(auction.phase(200), AuctionPhase::Open);
        assert_eq!(auction.phase(201), AuctionPhase::Closed);
    }

    #[test]
    fn test_ciphertext_from_parts_checks_nonce() {
        assert!(Ciphertext::from_parts(vec![1], &[0u8; 12]).is_ok());
        assert!(matches!(
            Ciphertext::from_parts(vec![1], &[0u8; 11]),
            Err(SchemaError::InvalidField { field: "nonce", .. })
        ));
    }

    #[test]
    fn test_transfer_request_requires_two_nonces() {
        let ct = serde_json::to_value(sample_ciphertext()).unwrap();
        let one_nonce = serde_json::json!({
            "from": "0",
            "to": "1",
            "amount": ct,
            "program": ct,
            "output_nonces": ["000000000000000000000000"],
        });
        let bytes = serde_json::to_vec(&one_nonce).unwrap();
        assert!(TransferRequest::decode(&bytes).is_err());

        let two_nonces = serde_json::json!({
            "from": "0",
            "to": "1",
            "amount": ct,
            "program": ct,
            "output_nonces": ["000000000000000000000000", "010101010101010101010101"],
        });
        let bytes = serde_json::to_vec(&two_nonces).unwrap();
        let request = TransferRequest::decode(&bytes).unwrap();
        assert_eq!(request.output_nonces[1], [1u8; 12]);
    }

    #[test]
    fn test_transfer_request_rejects_missing_program() {
        let ct = serde_json::to_value(sample_ciphertext()).unwrap();
        let payload = serde_json::json!({
            "from": "0",
            "to": "1",
            "amount": ct,
            "output_nonces": ["000000000000000000000000", "000000000000000000000000"],
        });
        let err = TransferRequest::decode(&serde_json::to_vec(&payload).unwrap()).unwrap_err();
        assert!(err.to_string().contains("transfer request"));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let json = br#"{"content":"01","nonce":"000000000000000000000000","extra":1}"#;
        assert!(Ciphertext::decode(json).is_err());
    }

    #[test]
    fn test_create_account_from_defaults_empty() {
        let ct = serde_json::to_value(sample_ciphertext()).unwrap();
        let payload = serde_json::json!({ "to": "alice", "balance": ct });
        let request =
            CreateAccountRequest::decode(&serde_json::to_vec(&payload).unwrap()).unwrap();
        assert!(request.from.is_empty());
        assert_eq!(request.balance, sample_ciphertext());
    }

    #[test]
    fn test_short_nonce_rejected() {
        let json = br#"{"content":"01","nonce":"0000000000000000000000"}"#;
        assert!(Ciphertext::decode(json).is_err());
    }

    #[test]
    fn test_ciphertext_json_shape() {
        let json = serde_json::to_value(sample_ciphertext()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "content": "01020304", "nonce": "070707070707070707070707" })
        );
    }
}
