//! Contract and ledger error types.

use thiserror::Error;

use tee_dispatcher::DispatchError;
use tee_types::SchemaError;

/// Errors raised by the ledger gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("{0} does not exist")]
    NotFound(String),

    #[error("stored record {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("read-write conflict on {0}")]
    Conflict(String),
}

/// Coarse classification of a contract failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any mutation
    Validation,
    /// State store failure
    Gateway,
    /// Dispatcher failure or malformed enclave result
    Compute,
}

/// Errors that can occur in the auction and payment contracts.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Unsupported function {0}")]
    UnknownFunction(String),

    #[error("{function}: expected {expected} argument(s), got {got}")]
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("{function}: invalid argument {name}: {reason}")]
    InvalidArgument {
        function: String,
        name: &'static str,
        reason: String,
    },

    #[error("{function}: {source}")]
    Schema {
        function: &'static str,
        #[source]
        source: SchemaError,
    },

    #[error("Invalid timing: start {start} must be before end {end}")]
    InvalidTiming { start: u64, end: u64 },

    #[error("Auction {0} already exists")]
    AuctionExists(String),

    #[error("Auction {auction_id} hasn't started. Now: {now}. Starts: {start}")]
    BiddingNotStarted {
        auction_id: String,
        now: u64,
        start: u64,
    },

    #[error("Auction {auction_id} has already ended. Now: {now}. Ended: {end}")]
    BiddingEnded {
        auction_id: String,
        now: u64,
        end: u64,
    },

    #[error("Account {0} already exists")]
    AccountExists(String),

    #[error("{operation} {key}: {source}")]
    Ledger {
        operation: &'static str,
        key: String,
        #[source]
        source: LedgerError,
    },

    #[error("{operation} {key}: confidential compute failed: {source}")]
    Compute {
        operation: &'static str,
        key: String,
        #[source]
        source: DispatchError,
    },

    #[error("{operation} {key}: malformed enclave result: expected {expected}, got {got}")]
    MalformedResult {
        operation: &'static str,
        key: String,
        expected: &'static str,
        got: usize,
    },
}

impl ContractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownFunction(_)
            | Self::ArgumentCount { .. }
            | Self::InvalidArgument { .. }
            | Self::Schema { .. }
            | Self::InvalidTiming { .. }
            | Self::AuctionExists(_)
            | Self::BiddingNotStarted { .. }
            | Self::BiddingEnded { .. }
            | Self::AccountExists(_) => ErrorKind::Validation,
            Self::Ledger { .. } => ErrorKind::Gateway,
            Self::Compute { .. } | Self::MalformedResult { .. } => ErrorKind::Compute,
        }
    }

    pub(crate) fn ledger(operation: &'static str, key: &str) -> impl FnOnce(LedgerError) -> Self {
        let key = key.to_string();
        move |source| Self::Ledger {
            operation,
            key,
            source,
        }
    }

    pub(crate) fn invalid(function: &str, name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            function: function.to_string(),
            name,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ContractError::UnknownFunction("burn".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ContractError::ledger("get auction", "a1")(LedgerError::NotFound("a1".into())).kind(),
            ErrorKind::Gateway
        );
        assert_eq!(
            ContractError::Compute {
                operation: "transfer",
                key: "0->1".into(),
                source: DispatchError::Closed,
            }
            .kind(),
            ErrorKind::Compute
        );
    }

    #[test]
    fn test_messages_name_operation_and_key() {
        let err = ContractError::Compute {
            operation: "end auction",
            key: "ab12".into(),
            source: DispatchError::Remote {
                operation: "compare".into(),
                reason: "boom".into(),
            },
        };
        let message = err.to_string();
        assert!(message.contains("end auction ab12"));
        assert!(message.contains("boom"));
    }
}
