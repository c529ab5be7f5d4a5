//! Simulated confidential-compute service.
//!
//! Opens feeds with the demo key, runs the requested operation in the clear
//! and hands back only comparison outcomes or re-sealed values:
//!
//! - `compare`: feeds `[challenger, baseline]`, returns `"1"`, `"0"` or `"-1"`
//! - `paymentCCtee`: feeds `[program, balanceFrom, balanceTo, amount]` and two
//!   output nonces; returns the re-sealed `from` and `to` balances

use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use thiserror::Error;
use tracing::{debug, info, warn};

use tee_crypto::{decode_amount, encode_amount, Codec, CryptoError};
use tee_dispatcher::EnclaveApiServer;
use tee_types::compute::{OP_COMPARE, OP_PAYMENT};
use tee_types::{ComputeResult, ComputeTask, Comparison};

/// Program identifier the transfer program ciphertext must open to.
pub const PROGRAM_TRANSFER: &[u8] = b"transfer/v1";

/// JSON-RPC error code for rejected tasks.
pub const TASK_REJECTED: i32 = -32000;

/// Errors raised while executing a task.
#[derive(Debug, Error)]
pub enum EnclaveError {
    #[error("Unknown operation {0}")]
    UnknownOperation(String),

    #[error("{operation}: expected {expected} feeds, got {got}")]
    FeedCount {
        operation: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{operation}: expected {expected} output nonces, got {got}")]
    NonceCount {
        operation: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Feed {index}: {source}")]
    Feed {
        index: usize,
        #[source]
        source: CryptoError,
    },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Output nonce reused")]
    NonceReuse,

    #[error("Unknown program")]
    UnknownProgram,

    #[error("Insufficient balance")]
    Overdraft,

    #[error("Balance overflow")]
    Overflow,
}

/// Executes compute tasks under one key.
#[derive(Debug, Clone)]
pub struct EnclaveSimulator {
    codec: Codec,
}

impl EnclaveSimulator {
    pub fn new(codec: Codec) -> Self {
        Self { codec }
    }

    /// Simulator over the demo key.
    pub fn demo() -> Self {
        Self::new(Codec::demo())
    }

    pub fn execute(&self, task: &ComputeTask) -> Result<ComputeResult, EnclaveError> {
        match task.operation.as_str() {
            OP_COMPARE => self.compare(task),
            OP_PAYMENT => self.payment(task),
            other => Err(EnclaveError::UnknownOperation(other.to_string())),
        }
    }

    fn compare(&self, task: &ComputeTask) -> Result<ComputeResult, EnclaveError> {
        expect_feeds(task, "compare", 2)?;
        let challenger = self.open_amount(task, 0)?;
        let baseline = self.open_amount(task, 1)?;

        let comparison = match challenger.cmp(&baseline) {
            std::cmp::Ordering::Greater => Comparison::Greater,
            std::cmp::Ordering::Equal => Comparison::Equal,
            std::cmp::Ordering::Less => Comparison::Less,
        };
        debug!(?comparison, "compare done");

        Ok(ComputeResult {
            plaintexts: vec![comparison.as_plaintext().to_vec()],
            reencrypted_feeds: Vec::new(),
        })
    }

    fn payment(&self, task: &ComputeTask) -> Result<ComputeResult, EnclaveError> {
        expect_feeds(task, "paymentCCtee", 4)?;
        if task.output_nonces.len() != 2 {
            return Err(EnclaveError::NonceCount {
                operation: "paymentCCtee",
                expected: 2,
                got: task.output_nonces.len(),
            });
        }
        let (out_from, out_to) = (&task.output_nonces[0], &task.output_nonces[1]);
        if out_from == out_to
            || [&task.feeds[1].nonce, &task.feeds[2].nonce]
                .iter()
                .any(|current| *current == out_from || *current == out_to)
        {
            return Err(EnclaveError::NonceReuse);
        }

        let program = self
            .codec
            .decrypt(&task.feeds[0])
            .map_err(|source| EnclaveError::Feed { index: 0, source })?;
        if program != PROGRAM_TRANSFER {
            return Err(EnclaveError::UnknownProgram);
        }

        let from = self.open_amount(task, 1)?;
        let to = self.open_amount(task, 2)?;
        let amount = self.open_amount(task, 3)?;

        let from = from.checked_sub(amount).ok_or(EnclaveError::Overdraft)?;
        let to = to.checked_add(amount).ok_or(EnclaveError::Overflow)?;

        let from = self
            .codec
            .seal_with_nonce(&encode_amount(from), &task.output_nonces[0])?;
        let to = self
            .codec
            .seal_with_nonce(&encode_amount(to), &task.output_nonces[1])?;
        debug!("paymentCCtee done");

        Ok(ComputeResult {
            plaintexts: Vec::new(),
            reencrypted_feeds: vec![from, to],
        })
    }

    fn open_amount(&self, task: &ComputeTask, index: usize) -> Result<u32, EnclaveError> {
        self.codec
            .decrypt(&task.feeds[index])
            .and_then(|plaintext| decode_amount(&plaintext))
            .map_err(|source| EnclaveError::Feed { index, source })
    }
}

fn expect_feeds(
    task: &ComputeTask,
    operation: &'static str,
    expected: usize,
) -> Result<(), EnclaveError> {
    if task.feeds.len() != expected {
        return Err(EnclaveError::FeedCount {
            operation,
            expected,
            got: task.feeds.len(),
        });
    }
    Ok(())
}

/// JSON-RPC front end for an [`EnclaveSimulator`].
pub struct EnclaveServer {
    simulator: Arc<EnclaveSimulator>,
}

impl EnclaveServer {
    pub fn new(simulator: EnclaveSimulator) -> Self {
        Self {
            simulator: Arc::new(simulator),
        }
    }

    fn rpc_error(msg: &str) -> ErrorObjectOwned {
        ErrorObjectOwned::owned(TASK_REJECTED, msg.to_string(), None::<()>)
    }
}

#[async_trait]
impl EnclaveApiServer for EnclaveServer {
    async fn execute(&self, task: ComputeTask) -> RpcResult<ComputeResult> {
        self.simulator.execute(&task).map_err(|e| {
            warn!(operation = %task.operation, error = %e, "Task rejected");
            Self::rpc_error(&e.to_string())
        })
    }
}

/// Bind and start the enclave RPC server. Returns the bound address.
pub async fn serve(
    addr: SocketAddr,
    simulator: EnclaveSimulator,
) -> std::io::Result<(SocketAddr, ServerHandle)> {
    let server = Server::builder().build(addr).await?;
    let local_addr = server.local_addr()?;
    let handle = server.start(EnclaveServer::new(simulator).into_rpc());
    info!(addr = %local_addr, "Enclave simulator listening");
    Ok((local_addr, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tee_types::Ciphertext;

    fn sealed(codec: &Codec, amount: u32) -> Ciphertext {
        codec.encrypt_amount(amount).unwrap()
    }

    fn payment_task(codec: &Codec, program: &[u8], from: u32, to: u32, amount: u32) -> ComputeTask {
        ComputeTask::new(
            OP_PAYMENT,
            vec![
                codec.encrypt(program).unwrap(),
                sealed(codec, from),
                sealed(codec, to),
                sealed(codec, amount),
            ],
        )
        .with_output_nonces([[1u8; 12], [2u8; 12]])
    }

    #[test]
    fn test_compare_outcomes() {
        let sim = EnclaveSimulator::demo();
        let codec = Codec::demo();
        for (a, b, expected) in [(20, 10, "1"), (10, 10, "0"), (5, 10, "-1")] {
            let task = ComputeTask::new(OP_COMPARE, vec![sealed(&codec, a), sealed(&codec, b)]);
            let result = sim.execute(&task).unwrap();
            assert_eq!(result.plaintexts, vec![expected.as_bytes().to_vec()]);
            assert!(result.reencrypted_feeds.is_empty());
        }
    }

    #[test]
    fn test_payment_reseals_with_given_nonces() {
        let sim = EnclaveSimulator::demo();
        let codec = Codec::demo();
        let result = sim
            .execute(&payment_task(&codec, PROGRAM_TRANSFER, 100, 50, 30))
            .unwrap();

        assert_eq!(result.reencrypted_feeds.len(), 2);
        assert_eq!(result.reencrypted_feeds[0].nonce, [1u8; 12]);
        assert_eq!(result.reencrypted_feeds[1].nonce, [2u8; 12]);
        assert_eq!(codec.decrypt_amount(&result.reencrypted_feeds[0]).unwrap(), 70);
        assert_eq!(codec.decrypt_amount(&result.reencrypted_feeds[1]).unwrap(), 80);
    }

    #[test]
    fn test_payment_rejects_overdraft_and_unknown_program() {
        let sim = EnclaveSimulator::demo();
        let codec = Codec::demo();
        assert!(matches!(
            sim.execute(&payment_task(&codec, PROGRAM_TRANSFER, 10, 0, 11)),
            Err(EnclaveError::Overdraft)
        ));
        assert!(matches!(
            sim.execute(&payment_task(&codec, b"mint/v1", 10, 0, 1)),
            Err(EnclaveError::UnknownProgram)
        ));
    }

    #[test]
    fn test_payment_rejects_reused_output_nonces() {
        let sim = EnclaveSimulator::demo();
        let codec = Codec::demo();

        let task = payment_task(&codec, PROGRAM_TRANSFER, 100, 50, 30)
            .with_output_nonces([[9u8; 12], [9u8; 12]]);
        assert!(matches!(sim.execute(&task), Err(EnclaveError::NonceReuse)));

        let task = payment_task(&codec, PROGRAM_TRANSFER, 100, 50, 30);
        let stale = task.feeds[2].nonce;
        let task = task.with_output_nonces([[1u8; 12], stale]);
        assert!(matches!(sim.execute(&task), Err(EnclaveError::NonceReuse)));
    }

    #[test]
    fn test_shape_errors() {
        let sim = EnclaveSimulator::demo();
        let codec = Codec::demo();

        let task = ComputeTask::new(OP_COMPARE, vec![sealed(&codec, 1)]);
        assert!(matches!(
            sim.execute(&task),
            Err(EnclaveError::FeedCount { expected: 2, got: 1, .. })
        ));

        let mut task = payment_task(&codec, PROGRAM_TRANSFER, 10, 0, 1);
        task.output_nonces.pop();
        assert!(matches!(
            sim.execute(&task),
            Err(EnclaveError::NonceCount { got: 1, .. })
        ));

        let task = ComputeTask::new("sum", vec![]);
        assert!(matches!(
            sim.execute(&task),
            Err(EnclaveError::UnknownOperation(_))
        ));
    }

    #[test]
    fn test_feed_under_wrong_key() {
        let sim = EnclaveSimulator::demo();
        let other = Codec::new(&[7u8; 32]).unwrap();
        let codec = Codec::demo();
        let task = ComputeTask::new(OP_COMPARE, vec![sealed(&codec, 1), sealed(&other, 1)]);
        assert!(matches!(
            sim.execute(&task),
            Err(EnclaveError::Feed { index: 1, .. })
        ));
    }
}
