//! Ledger contracts backed by confidential compute.
//!
//! This crate implements the on-ledger half of two protocols whose values
//! stay encrypted end to end:
//!
//! - Sealed-bid auctions whose winner is found by enclave comparisons
//! - Encrypted account balances updated by an enclave transfer program
//!
//! # Architecture
//!
//! - `ledger`: the state gateway trait and an in-memory MVCC implementation
//! - `auction` / `payment`: contract logic over a [`LedgerStub`]
//! - `call`: invocation parsing, routing and atomic commit
//! - `handlers`: call context and typed record access
//! - `error`: error types
//!
//! Contracts hold an `Arc<dyn ConfidentialCompute>`, normally a
//! [`tee_dispatcher::Dispatcher`].
//!
//! # Example
//!
//! ```ignore
//! use tee_module::{invoke_auction, AuctionContract, CallContext, Invocation, MemoryLedger};
//!
//! let ledger = MemoryLedger::new();
//! let contract = AuctionContract::new(dispatcher.clone());
//! let ctx = CallContext { timestamp: 1_700_000_000 };
//!
//! let create = Invocation::new("create", ["0", "60", "5"]);
//! let id = invoke_auction(&ledger, &contract, &ctx, &create).await?;
//! ```

pub mod auction;
pub mod call;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod payment;

#[cfg(test)]
mod testing;

pub use auction::{AuctionContract, EndSummary, AUCTION_COLLECTION};
pub use call::{invoke_auction, invoke_payment, AuctionCall, Invocation, PaymentCall};
pub use error::{ContractError, ErrorKind, LedgerError};
pub use handlers::{CallContext, HandlerResult};
pub use ledger::{LedgerStub, LedgerTx, MemoryLedger};
pub use payment::{PaymentContract, PAYMENT_COLLECTION};
