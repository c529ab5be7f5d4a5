//! Invocation routing for the auction and payment contracts.
//!
//! An [`Invocation`] is a function name plus string arguments, as submitted
//! to the ledger. It is parsed into a typed call, applied inside one ledger
//! transaction, and committed only if the handler succeeded.

use serde::{Deserialize, Serialize};
use tracing::warn;

use tee_types::{Ciphertext, CreateAccountRequest, Schema, TransferRequest};

use crate::auction::AuctionContract;
use crate::error::ContractError;
use crate::handlers::{CallContext, HandlerResult};
use crate::ledger::{LedgerStub, MemoryLedger};
use crate::payment::PaymentContract;

/// A raw contract invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Invocation {
    pub function: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(
        function: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            function: function.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn expect_args(&self, expected: usize) -> HandlerResult<()> {
        if self.args.len() != expected {
            return Err(ContractError::ArgumentCount {
                function: self.function.clone(),
                expected,
                got: self.args.len(),
            });
        }
        Ok(())
    }

    fn integer(&self, index: usize, name: &'static str) -> HandlerResult<u64> {
        self.args[index]
            .trim()
            .parse()
            .map_err(|e| ContractError::invalid(&self.function, name, format!("{}", e)))
    }

    fn bytes(&self, index: usize, name: &'static str) -> HandlerResult<Vec<u8>> {
        hex::decode(self.args[index].trim())
            .map_err(|e| ContractError::invalid(&self.function, name, format!("{}", e)))
    }

    fn non_empty(&self, index: usize, name: &'static str) -> HandlerResult<String> {
        let value = self.args[index].trim();
        if value.is_empty() {
            return Err(ContractError::invalid(&self.function, name, "empty"));
        }
        Ok(value.to_string())
    }
}

/// Call messages for the auction contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuctionCall {
    /// `create(start, end, startingBid)`
    Create {
        start: u64,
        end: u64,
        starting_bid: u64,
    },

    /// `bid(auctionId, cert, ciphertextHex, nonceHex)`
    Bid {
        auction_id: String,
        cert: String,
        value: Ciphertext,
    },

    /// `end(auctionId)`
    End { auction_id: String },

    /// `query(auctionId)`
    Query { auction_id: String },
}

impl TryFrom<&Invocation> for AuctionCall {
    type Error = ContractError;

    fn try_from(inv: &Invocation) -> HandlerResult<Self> {
        match inv.function.as_str() {
            "create" => {
                inv.expect_args(3)?;
                Ok(Self::Create {
                    start: inv.integer(0, "start")?,
                    end: inv.integer(1, "end")?,
                    starting_bid: inv.integer(2, "startingBid")?,
                })
            }
            "bid" => {
                inv.expect_args(4)?;
                let content = inv.bytes(2, "value")?;
                let nonce = inv.bytes(3, "nonce")?;
                let value = Ciphertext::from_parts(content, &nonce)
                    .map_err(|source| ContractError::Schema {
                        function: "bid",
                        source,
                    })?;
                Ok(Self::Bid {
                    auction_id: inv.non_empty(0, "auctionId")?,
                    cert: inv.args[1].clone(),
                    value,
                })
            }
            "end" => {
                inv.expect_args(1)?;
                Ok(Self::End {
                    auction_id: inv.non_empty(0, "auctionId")?,
                })
            }
            "query" => {
                inv.expect_args(1)?;
                Ok(Self::Query {
                    auction_id: inv.non_empty(0, "auctionId")?,
                })
            }
            other => Err(ContractError::UnknownFunction(other.to_string())),
        }
    }
}

impl AuctionCall {
    /// Run the call against `stub`. Returns the response payload.
    pub async fn apply(
        self,
        contract: &AuctionContract,
        stub: &mut impl LedgerStub,
        ctx: &CallContext,
    ) -> HandlerResult<Vec<u8>> {
        match self {
            Self::Create {
                start,
                end,
                starting_bid,
            } => contract
                .create(stub, start, end, starting_bid)
                .map(String::into_bytes),
            Self::Bid {
                auction_id,
                cert,
                value,
            } => contract
                .bid(stub, ctx, &auction_id, &cert, value)
                .map(String::into_bytes),
            Self::End { auction_id } => contract
                .end(stub, &auction_id)
                .await
                .map(|summary| summary.to_string().into_bytes()),
            Self::Query { auction_id } => contract.query(stub, &auction_id),
        }
    }
}

/// Call messages for the payment contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentCall {
    /// `create(payload)`
    Create(CreateAccountRequest),

    /// `transfer(payload)`
    Transfer(TransferRequest),

    /// `query(accountId)`
    Query { account_id: String },
}

impl TryFrom<&Invocation> for PaymentCall {
    type Error = ContractError;

    fn try_from(inv: &Invocation) -> HandlerResult<Self> {
        match inv.function.as_str() {
            "create" => {
                inv.expect_args(1)?;
                CreateAccountRequest::decode(inv.args[0].as_bytes())
                    .map(Self::Create)
                    .map_err(|source| ContractError::Schema {
                        function: "create",
                        source,
                    })
            }
            "transfer" => {
                inv.expect_args(1)?;
                TransferRequest::decode(inv.args[0].as_bytes())
                    .map(Self::Transfer)
                    .map_err(|source| ContractError::Schema {
                        function: "transfer",
                        source,
                    })
            }
            "query" => {
                inv.expect_args(1)?;
                Ok(Self::Query {
                    account_id: inv.non_empty(0, "accountId")?,
                })
            }
            other => Err(ContractError::UnknownFunction(other.to_string())),
        }
    }
}

impl PaymentCall {
    /// Run the call against `stub`. Returns the response payload.
    pub async fn apply(
        self,
        contract: &PaymentContract,
        stub: &mut impl LedgerStub,
    ) -> HandlerResult<Vec<u8>> {
        match self {
            Self::Create(request) => contract.create(stub, request).map(|()| Vec::new()),
            Self::Transfer(request) => contract
                .transfer(stub, request)
                .await
                .map(|()| Vec::new()),
            Self::Query { account_id } => contract.query(stub, &account_id),
        }
    }
}

/// Parse, apply and commit one auction invocation.
pub async fn invoke_auction(
    ledger: &MemoryLedger,
    contract: &AuctionContract,
    ctx: &CallContext,
    invocation: &Invocation,
) -> HandlerResult<Vec<u8>> {
    let call = AuctionCall::try_from(invocation)?;
    let mut tx = ledger.begin();
    let response = call.apply(contract, &mut tx, ctx).await?;
    tx.commit()
        .map_err(ContractError::ledger("commit", &invocation.function))
        .inspect_err(|e| warn!(function = %invocation.function, error = %e, "Commit failed"))?;
    Ok(response)
}

/// Parse, apply and commit one payment invocation.
pub async fn invoke_payment(
    ledger: &MemoryLedger,
    contract: &PaymentContract,
    invocation: &Invocation,
) -> HandlerResult<Vec<u8>> {
    let call = PaymentCall::try_from(invocation)?;
    let mut tx = ledger.begin();
    let response = call.apply(contract, &mut tx).await?;
    tx.commit()
        .map_err(ContractError::ledger("commit", &invocation.function))
        .inspect_err(|e| warn!(function = %invocation.function, error = %e, "Commit failed"))?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::FakeCompute;
    use tee_crypto::Codec;

    #[test]
    fn test_unknown_function() {
        let err = AuctionCall::try_from(&Invocation::new("burn", ["x"])).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported function burn");
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = PaymentCall::try_from(&Invocation::new("mint", ["x"])).unwrap_err();
        assert!(matches!(err, ContractError::UnknownFunction(_)));
    }

    #[test]
    fn test_parse_auction_calls() {
        assert_eq!(
            AuctionCall::try_from(&Invocation::new("create", ["100", "200", "5"])).unwrap(),
            AuctionCall::Create {
                start: 100,
                end: 200,
                starting_bid: 5
            }
        );

        let call = AuctionCall::try_from(&Invocation::new(
            "bid",
            ["a1", "cert", "0a0b", "000102030405060708090a0b"],
        ))
        .unwrap();
        let AuctionCall::Bid { value, .. } = call else {
            panic!("expected bid");
        };
        assert_eq!(value.content, vec![0x0a, 0x0b]);
        assert_eq!(value.nonce[11], 0x0b);
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        let cases = [
            Invocation::new("create", ["100", "200"]),
            Invocation::new("create", ["soon", "200", "5"]),
            Invocation::new("bid", ["a1", "cert", "zz", "00"]),
            Invocation::new("bid", ["a1", "cert", "0a", "0001"]),
            Invocation::new("end", [""]),
        ];
        for inv in &cases {
            let err = AuctionCall::try_from(inv).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{:?}", inv);
        }
    }

    #[test]
    fn test_parse_transfer_requires_program() {
        let payload = r#"{"from":"0","to":"1","amount":{"content":"01","nonce":"000000000000000000000000"},"output_nonces":["000000000000000000000000","000000000000000000000000"]}"#;
        let err = PaymentCall::try_from(&Invocation::new("transfer", [payload])).unwrap_err();
        assert!(matches!(err, ContractError::Schema { function: "transfer", .. }));
    }

    #[tokio::test]
    async fn test_invoke_auction_end_to_end() {
        let ledger = MemoryLedger::new();
        let codec = Codec::demo();
        let contract = AuctionContract::new(FakeCompute::comparing());

        let id = invoke_auction(
            &ledger,
            &contract,
            &CallContext { timestamp: 0 },
            &Invocation::new("create", ["100", "200", "5"]),
        )
        .await
        .unwrap();
        let id = String::from_utf8(id).unwrap();

        let mut bid_ids = Vec::new();
        for amount in [10u32, 20] {
            let sealed = codec.encrypt_amount(amount).unwrap();
            let bid_id = invoke_auction(
                &ledger,
                &contract,
                &CallContext { timestamp: 150 },
                &Invocation::new(
                    "bid",
                    [
                        id.clone(),
                        "cert".into(),
                        hex::encode(&sealed.content),
                        hex::encode(sealed.nonce),
                    ],
                ),
            )
            .await
            .unwrap();
            bid_ids.push(String::from_utf8(bid_id).unwrap());
        }

        let summary = invoke_auction(
            &ledger,
            &contract,
            &CallContext { timestamp: 300 },
            &Invocation::new("end", [id.clone()]),
        )
        .await
        .unwrap();
        let summary = String::from_utf8(summary).unwrap();
        assert!(summary.starts_with(&format!("the winner bid id is {}", bid_ids[1])));
    }

    #[tokio::test]
    async fn test_failed_invocation_is_not_committed() {
        let ledger = MemoryLedger::new();
        let contract = AuctionContract::new(FakeCompute::comparing());
        let err = invoke_auction(
            &ledger,
            &contract,
            &CallContext { timestamp: 0 },
            &Invocation::new("bid", ["missing", "c", "01", "000000000000000000000000"]),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Gateway);
        assert_eq!(ledger.height(), 0);
    }
}
