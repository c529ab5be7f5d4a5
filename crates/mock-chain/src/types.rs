//! RPC parameter and response types for the mock chain.

use serde::{Deserialize, Serialize};

use tee_types::Ciphertext;

/// Chain clock and height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    /// Committed transactions
    pub height: u64,
    /// Timestamp the next invocation will see
    pub timestamp: u64,
    /// Whether the clock is pinned by `admin_setTimestamp`
    pub pinned: bool,
}

/// Parameters for creating an auction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateAuctionParams {
    pub start: u64,
    pub end: u64,
    #[serde(default)]
    pub starting_bid: u64,
}

/// Parameters for submitting a sealed bid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BidParams {
    pub auction_id: String,
    pub cert: String,
    pub value: Ciphertext,
}

/// Which contract a raw invocation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chaincode {
    Auction,
    Payment,
}
