//! Encrypted-balance payment contract.
//!
//! Balances are sealed under the enclave key and only ever replaced with
//! values the enclave re-sealed. A transfer sends the encrypted program, both
//! balances and the encrypted amount to `paymentCCtee` and stores the two
//! returned ciphertexts as the new balances. Overdraft checks live in the
//! enclave program.

use std::sync::Arc;

use tracing::{debug, info};

use tee_dispatcher::ConfidentialCompute;
use tee_types::compute::OP_PAYMENT;
use tee_types::{Account, ComputeTask, CreateAccountRequest, TransferRequest};

use crate::error::{ContractError, LedgerError};
use crate::handlers::{load_private, store_private, HandlerResult};
use crate::ledger::LedgerStub;

/// Private collection holding encrypted balances.
pub const PAYMENT_COLLECTION: &str = "collectionPayment";

/// Payment contract bound to a confidential-compute backend.
#[derive(Clone)]
pub struct PaymentContract {
    compute: Arc<dyn ConfidentialCompute>,
}

impl PaymentContract {
    pub fn new(compute: Arc<dyn ConfidentialCompute>) -> Self {
        Self { compute }
    }

    /// Open an account with an initial sealed balance.
    pub fn create(
        &self,
        stub: &mut impl LedgerStub,
        request: CreateAccountRequest,
    ) -> HandlerResult<()> {
        if !request.from.is_empty() {
            return Err(ContractError::invalid(
                "create",
                "from",
                format!("must be empty, got {}", request.from),
            ));
        }
        if request.to.is_empty() {
            return Err(ContractError::invalid("create", "to", "empty account id"));
        }

        let existing = stub
            .get_private_data(PAYMENT_COLLECTION, &request.to)
            .map_err(ContractError::ledger("create account", &request.to))?;
        if existing.is_some() {
            return Err(ContractError::AccountExists(request.to));
        }

        let account = Account {
            balance: request.balance,
        };
        store_private(
            stub,
            PAYMENT_COLLECTION,
            "create account",
            &request.to,
            &account,
        )?;

        info!(account = %request.to, "Account created");
        Ok(())
    }

    /// Move a sealed amount between two accounts.
    pub async fn transfer(
        &self,
        stub: &mut impl LedgerStub,
        request: TransferRequest,
    ) -> HandlerResult<()> {
        if request.from.is_empty() {
            return Err(ContractError::invalid("transfer", "from", "empty account id"));
        }
        if request.to.is_empty() {
            return Err(ContractError::invalid("transfer", "to", "empty account id"));
        }
        if request.from == request.to {
            debug!(account = %request.from, "Self transfer, nothing to do");
            return Ok(());
        }
        let [out_from, out_to] = request.output_nonces;
        if out_from == out_to {
            return Err(ContractError::invalid(
                "transfer",
                "output_nonces",
                "both balances would be sealed under the same nonce",
            ));
        }

        let key = format!("{}->{}", request.from, request.to);
        let from: Account = load_private(stub, PAYMENT_COLLECTION, "transfer", &request.from)?;
        let to: Account = load_private(stub, PAYMENT_COLLECTION, "transfer", &request.to)?;

        // Every stored balance must carry a nonce it has never been sealed under.
        for current in [&from.balance.nonce, &to.balance.nonce] {
            if *current == out_from || *current == out_to {
                let reason = format!(
                    "nonce {} already seals a stored balance",
                    hex::encode(current)
                );
                return Err(ContractError::invalid("transfer", "output_nonces", reason));
            }
        }

        let task = ComputeTask::new(
            OP_PAYMENT,
            vec![request.program, from.balance, to.balance, request.amount],
        )
        .with_output_nonces(request.output_nonces);

        let result = self
            .compute
            .execute(task)
            .await
            .map_err(|source| ContractError::Compute {
                operation: "transfer",
                key: key.clone(),
                source,
            })?;

        let [new_from, new_to]: [_; 2] =
            result
                .reencrypted_feeds
                .try_into()
                .map_err(|feeds: Vec<_>| ContractError::MalformedResult {
                    operation: "transfer",
                    key: key.clone(),
                    expected: "two re-encrypted balances",
                    got: feeds.len(),
                })?;

        store_private(
            stub,
            PAYMENT_COLLECTION,
            "transfer",
            &request.from,
            &Account { balance: new_from },
        )?;
        store_private(
            stub,
            PAYMENT_COLLECTION,
            "transfer",
            &request.to,
            &Account { balance: new_to },
        )?;

        info!(from = %request.from, to = %request.to, "Transfer applied");
        Ok(())
    }

    /// Raw stored account record.
    pub fn query(&self, stub: &mut impl LedgerStub, account_id: &str) -> HandlerResult<Vec<u8>> {
        stub.get_private_data(PAYMENT_COLLECTION, account_id)
            .map_err(ContractError::ledger("query account", account_id))?
            .ok_or_else(|| {
                ContractError::ledger("query account", account_id)(LedgerError::NotFound(
                    format!("{}/{}", PAYMENT_COLLECTION, account_id),
                ))
            })
    }
}
