//! Sealed-bid auction contract.
//!
//! Bids are sealed client-side and never opened on the ledger. `end` folds
//! the bid list left to right, asking the enclave to compare the challenger
//! with the retained winner for every bid after the first:
//!
//! - `"1"`: the challenger becomes the provisional winner
//! - `"0"`: tie, the auction has no winner but the retained bid is kept as
//!   the baseline for later comparisons
//! - anything else: the challenger lost
//!
//! The auction record is written once, after the whole fold succeeded.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use tee_dispatcher::ConfidentialCompute;
use tee_types::compute::OP_COMPARE;
use tee_types::{Auction, AuctionPhase, Bid, Ciphertext, Comparison, ComputeTask};

use crate::error::{ContractError, LedgerError};
use crate::handlers::{
    load_private, load_state, random_id, store_private, store_state, CallContext, HandlerResult,
};
use crate::ledger::LedgerStub;

/// Private collection holding sealed bids.
pub const AUCTION_COLLECTION: &str = "collectionAuction";

/// Outcome of `end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndSummary {
    /// Winning bid id, empty on a tie or when there were no bids
    pub winner: String,
    /// Retained winning ciphertext
    pub value: Option<Ciphertext>,
}

impl fmt::Display for EndSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(
                f,
                "the winner bid id is {}, value: {}",
                self.winner,
                hex::encode(&value.content)
            ),
            None => write!(f, "the winner bid id is {}, value: none", self.winner),
        }
    }
}

/// Auction contract bound to a confidential-compute backend.
#[derive(Clone)]
pub struct AuctionContract {
    compute: Arc<dyn ConfidentialCompute>,
}

impl AuctionContract {
    pub fn new(compute: Arc<dyn ConfidentialCompute>) -> Self {
        Self { compute }
    }

    /// Create an auction open for bids in `[start, end]`.
    pub fn create(
        &self,
        stub: &mut impl LedgerStub,
        start: u64,
        end: u64,
        starting_bid: u64,
    ) -> HandlerResult<String> {
        if start >= end {
            return Err(ContractError::InvalidTiming { start, end });
        }

        let auction_id = random_id();
        let existing = stub
            .get_state(&auction_id)
            .map_err(ContractError::ledger("create auction", &auction_id))?;
        if existing.is_some() {
            return Err(ContractError::AuctionExists(auction_id));
        }

        let auction = Auction::new(auction_id.clone(), start, end, starting_bid);
        store_state(stub, "create auction", &auction_id, &auction)?;

        info!(auction_id = %auction_id, start, end, starting_bid, "Auction created");
        Ok(auction_id)
    }

    /// Record a sealed bid. Returns the new bid id.
    pub fn bid(
        &self,
        stub: &mut impl LedgerStub,
        ctx: &CallContext,
        auction_id: &str,
        cert: &str,
        value: Ciphertext,
    ) -> HandlerResult<String> {
        if auction_id.is_empty() {
            return Err(ContractError::invalid("bid", "auction_id", "empty auction id"));
        }
        if cert.is_empty() {
            return Err(ContractError::invalid("bid", "cert", "empty certificate"));
        }
        if value.content.is_empty() {
            return Err(ContractError::invalid("bid", "value", "empty ciphertext"));
        }

        let mut auction: Auction = load_state(stub, "bid on auction", auction_id)?;
        match auction.phase(ctx.timestamp) {
            AuctionPhase::Pending => {
                return Err(ContractError::BiddingNotStarted {
                    auction_id: auction_id.to_string(),
                    now: ctx.timestamp,
                    start: auction.start,
                })
            }
            AuctionPhase::Closed => {
                return Err(ContractError::BiddingEnded {
                    auction_id: auction_id.to_string(),
                    now: ctx.timestamp,
                    end: auction.end,
                })
            }
            AuctionPhase::Open => {}
        }

        let bid_id = random_id();
        let bid = Bid {
            id: bid_id.clone(),
            cert: cert.to_string(),
            value,
        };
        store_private(stub, AUCTION_COLLECTION, "store bid", &bid_id, &bid)?;

        auction.bids.push(bid_id.clone());
        store_state(stub, "bid on auction", auction_id, &auction)?;

        info!(
            auction_id = %auction_id,
            bid_id = %bid_id,
            bids = auction.bids.len(),
            "Bid recorded"
        );
        Ok(bid_id)
    }

    /// Fold the bids into a winner and persist it.
    ///
    /// Any compute failure aborts before the auction is written, so `end` can
    /// simply be invoked again.
    pub async fn end(
        &self,
        stub: &mut impl LedgerStub,
        auction_id: &str,
    ) -> HandlerResult<EndSummary> {
        let mut auction: Auction = load_state(stub, "end auction", auction_id)?;

        let mut bids = Vec::with_capacity(auction.bids.len());
        for bid_id in &auction.bids {
            let bid: Bid = load_private(stub, AUCTION_COLLECTION, "end auction", bid_id)?;
            bids.push(bid);
        }

        let summary = self.fold(auction_id, bids).await?;

        auction.winner = summary.winner.clone();
        auction.value = summary.value.clone();
        auction.ended = true;
        store_state(stub, "end auction", auction_id, &auction)?;

        info!(
            auction_id = %auction_id,
            winner = %summary.winner,
            bids = auction.bids.len(),
            "Auction ended"
        );
        Ok(summary)
    }

    async fn fold(&self, auction_id: &str, bids: Vec<Bid>) -> HandlerResult<EndSummary> {
        let mut bids = bids.into_iter();
        let Some(first) = bids.next() else {
            return Ok(EndSummary {
                winner: String::new(),
                value: None,
            });
        };

        let mut winner = first.id;
        let mut baseline = first.value;

        for challenger in bids {
            let task = ComputeTask::new(
                OP_COMPARE,
                vec![challenger.value.clone(), baseline.clone()],
            );
            let result = self
                .compute
                .execute(task)
                .await
                .map_err(|source| ContractError::Compute {
                    operation: "end auction",
                    key: auction_id.to_string(),
                    source,
                })?;

            let Some(plaintext) = result.plaintexts.first() else {
                return Err(ContractError::MalformedResult {
                    operation: "end auction",
                    key: auction_id.to_string(),
                    expected: "one comparison plaintext",
                    got: 0,
                });
            };

            match Comparison::from_plaintext(plaintext) {
                Comparison::Greater => {
                    debug!(
                        auction_id = %auction_id,
                        bid_id = %challenger.id,
                        "New provisional winner"
                    );
                    winner = challenger.id;
                    baseline = challenger.value;
                }
                Comparison::Equal => {
                    debug!(
                        auction_id = %auction_id,
                        bid_id = %challenger.id,
                        "Tie with provisional winner"
                    );
                    winner.clear();
                }
                Comparison::Less => {}
            }
        }

        Ok(EndSummary {
            winner,
            value: Some(baseline),
        })
    }

    /// Raw stored auction record.
    pub fn query(&self, stub: &mut impl LedgerStub, auction_id: &str) -> HandlerResult<Vec<u8>> {
        stub.get_state(auction_id)
            .map_err(ContractError::ledger("query auction", auction_id))?
            .ok_or_else(|| {
                ContractError::ledger("query auction", auction_id)(LedgerError::NotFound(
                    auction_id.to_string(),
                ))
            })
    }
}
