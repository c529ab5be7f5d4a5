//! End-to-end integration tests for the enclave-backed contracts.
//!
//! Each test runs the full stack in-process:
//! 1. Enclave simulator serving JSON-RPC on an ephemeral port
//! 2. Dispatcher with persistent WebSocket connections to it
//! 3. In-memory ledger with the auction and payment contracts
//! 4. Invocations submitted as raw function name and string arguments

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use jsonrpsee::server::ServerHandle;
use rand::RngCore;

use enclave_sim::{serve, EnclaveSimulator, PROGRAM_TRANSFER};
use tee_crypto::Codec;
use tee_dispatcher::{ConfidentialCompute, DispatchError, Dispatcher, DispatcherConfig};
use tee_module::{
    invoke_auction, invoke_payment, AuctionContract, CallContext, ErrorKind, Invocation,
    MemoryLedger, PaymentContract, AUCTION_COLLECTION, PAYMENT_COLLECTION,
};
use tee_types::compute::{OP_COMPARE, OP_PAYMENT};
use tee_types::{Account, Auction, Bid, ComputeTask, CreateAccountRequest, Schema, TransferRequest};

/// A running enclave simulator plus a dispatcher connected to it.
struct Stack {
    dispatcher: Arc<Dispatcher>,
    ledger: MemoryLedger,
    codec: Codec,
    _enclave: ServerHandle,
}

impl Stack {
    async fn start(workers: usize) -> Result<Self> {
        let (addr, handle) = serve("127.0.0.1:0".parse()?, EnclaveSimulator::demo()).await?;
        let config = DispatcherConfig {
            server_addr: format!("ws://{}", addr),
            workers,
            call_timeout: Duration::from_secs(10),
        };
        let dispatcher = Dispatcher::connect(&config).await?;
        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            ledger: MemoryLedger::new(),
            codec: Codec::demo(),
            _enclave: handle,
        })
    }

    fn compute(&self) -> Arc<dyn ConfidentialCompute> {
        self.dispatcher.clone()
    }

    async fn auction(&self, timestamp: u64, function: &str, args: Vec<String>) -> Result<String> {
        let contract = AuctionContract::new(self.compute());
        let payload = invoke_auction(
            &self.ledger,
            &contract,
            &CallContext { timestamp },
            &Invocation::new(function, args),
        )
        .await?;
        Ok(String::from_utf8(payload)?)
    }

    async fn payment(&self, function: &str, payload: String) -> Result<()> {
        let contract = PaymentContract::new(self.compute());
        invoke_payment(&self.ledger, &contract, &Invocation::new(function, [payload])).await?;
        Ok(())
    }

    fn balance(&self, account: &str) -> Result<u32> {
        let raw = self
            .ledger
            .private_data(PAYMENT_COLLECTION, account)
            .ok_or_else(|| anyhow!("account {} missing", account))?;
        Ok(self.codec.decrypt_amount(&Account::decode(&raw)?.balance)?)
    }
}

fn fresh_nonce() -> [u8; 12] {
    let mut nonce = [0u8; 12];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

async fn place_bids(stack: &Stack, auction_id: &str, amounts: &[u32]) -> Result<Vec<String>> {
    let mut bid_ids = Vec::new();
    for (i, amount) in amounts.iter().enumerate() {
        let sealed = stack.codec.encrypt_amount(*amount)?;
        let bid_id = stack
            .auction(
                150,
                "bid",
                vec![
                    auction_id.to_string(),
                    format!("bidder-{}", i),
                    hex::encode(&sealed.content),
                    hex::encode(sealed.nonce),
                ],
            )
            .await?;
        bid_ids.push(bid_id);
    }
    Ok(bid_ids)
}

/// Test the complete auction flow through the real enclave service.
#[tokio::test]
async fn test_full_auction_flow() -> Result<()> {
    let stack = Stack::start(4).await?;

    let auction_id = stack
        .auction(0, "create", vec!["100".into(), "200".into(), "5".into()])
        .await?;
    let bid_ids = place_bids(&stack, &auction_id, &[10, 40, 25]).await?;

    // Late bid is rejected and leaves the list untouched.
    let late = stack.codec.encrypt_amount(99)?;
    let err = invoke_auction(
        &stack.ledger,
        &AuctionContract::new(stack.compute()),
        &CallContext { timestamp: 201 },
        &Invocation::new(
            "bid",
            [
                auction_id.clone(),
                "late".into(),
                hex::encode(&late.content),
                hex::encode(late.nonce),
            ],
        ),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let summary = stack.auction(300, "end", vec![auction_id.clone()]).await?;
    assert!(summary.starts_with(&format!("the winner bid id is {}, value: ", bid_ids[1])));

    let raw = stack.auction(300, "query", vec![auction_id.clone()]).await?;
    let auction = Auction::decode(raw.as_bytes())?;
    assert_eq!(auction.bids, bid_ids);
    assert_eq!(auction.winner, bid_ids[1]);
    let value = auction.value.ok_or_else(|| anyhow!("no winning value"))?;
    assert_eq!(stack.codec.decrypt_amount(&value)?, 40);

    Ok(())
}

/// Ties clear the winner but keep the retained bid as the baseline.
#[tokio::test]
async fn test_auction_tie_semantics() -> Result<()> {
    let stack = Stack::start(2).await?;

    let auction_id = stack
        .auction(0, "create", vec!["100".into(), "200".into(), "0".into()])
        .await?;
    let bid_ids = place_bids(&stack, &auction_id, &[10, 20, 20, 15]).await?;

    let summary = stack.auction(300, "end", vec![auction_id.clone()]).await?;
    assert!(summary.starts_with("the winner bid id is , value: "));

    let auction = Auction::decode(&stack.ledger.state(&auction_id).unwrap())?;
    assert_eq!(auction.winner, "");
    let second = Bid::decode(
        &stack
            .ledger
            .private_data(AUCTION_COLLECTION, &bid_ids[1])
            .unwrap(),
    )?;
    assert_eq!(auction.value, Some(second.value));

    Ok(())
}

/// Test encrypted balance transfers end to end.
#[tokio::test]
async fn test_payment_flow() -> Result<()> {
    let stack = Stack::start(2).await?;

    for (account, balance) in [("0", 100u32), ("1", 50)] {
        let request = CreateAccountRequest {
            from: String::new(),
            to: account.into(),
            balance: stack.codec.encrypt_amount(balance)?,
        };
        stack
            .payment("create", String::from_utf8(request.encode()?)?)
            .await?;
    }

    let transfer = |amount: u32, from: &str, to: &str| -> Result<String> {
        let request = TransferRequest {
            from: from.into(),
            to: to.into(),
            amount: stack.codec.encrypt_amount(amount)?,
            program: stack.codec.encrypt(PROGRAM_TRANSFER)?,
            output_nonces: [fresh_nonce(), fresh_nonce()],
        };
        Ok(String::from_utf8(request.encode()?)?)
    };

    stack.payment("transfer", transfer(30, "0", "1")?).await?;
    assert_eq!(stack.balance("0")?, 70);
    assert_eq!(stack.balance("1")?, 80);

    // Self transfer is a no-op.
    let before = stack.ledger.private_data(PAYMENT_COLLECTION, "0");
    stack.payment("transfer", transfer(5, "0", "0")?).await?;
    assert_eq!(stack.ledger.private_data(PAYMENT_COLLECTION, "0"), before);

    // Overdraft is refused by the enclave and nothing is written.
    let before_from = stack.ledger.private_data(PAYMENT_COLLECTION, "1");
    let before_to = stack.ledger.private_data(PAYMENT_COLLECTION, "0");
    let contract = PaymentContract::new(stack.compute());
    let err = invoke_payment(
        &stack.ledger,
        &contract,
        &Invocation::new("transfer", [transfer(500, "1", "0")?]),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Compute);
    assert!(err.to_string().contains("Insufficient balance"));
    assert_eq!(stack.ledger.private_data(PAYMENT_COLLECTION, "1"), before_from);
    assert_eq!(stack.ledger.private_data(PAYMENT_COLLECTION, "0"), before_to);

    Ok(())
}

/// Output nonces that would reseal two balances alike are refused at both ends.
#[tokio::test]
async fn test_reused_output_nonces_rejected() -> Result<()> {
    let stack = Stack::start(1).await?;

    for (account, balance) in [("0", 100u32), ("1", 50)] {
        let request = CreateAccountRequest {
            from: String::new(),
            to: account.into(),
            balance: stack.codec.encrypt_amount(balance)?,
        };
        stack
            .payment("create", String::from_utf8(request.encode()?)?)
            .await?;
    }
    let before_from = stack.ledger.private_data(PAYMENT_COLLECTION, "0");
    let before_to = stack.ledger.private_data(PAYMENT_COLLECTION, "1");

    let request = TransferRequest {
        from: "0".into(),
        to: "1".into(),
        amount: stack.codec.encrypt_amount(30)?,
        program: stack.codec.encrypt(PROGRAM_TRANSFER)?,
        output_nonces: [[7u8; 12], [7u8; 12]],
    };
    let contract = PaymentContract::new(stack.compute());
    let err = invoke_payment(
        &stack.ledger,
        &contract,
        &Invocation::new("transfer", [String::from_utf8(request.encode()?)?]),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(stack.ledger.private_data(PAYMENT_COLLECTION, "0"), before_from);
    assert_eq!(stack.ledger.private_data(PAYMENT_COLLECTION, "1"), before_to);

    // The enclave refuses the same task even when sent directly.
    let from = Account::decode(&before_from.ok_or_else(|| anyhow!("account 0 missing"))?)?;
    let to = Account::decode(&before_to.ok_or_else(|| anyhow!("account 1 missing"))?)?;
    let task = ComputeTask::new(
        OP_PAYMENT,
        vec![request.program, from.balance, to.balance, request.amount],
    )
    .with_output_nonces(request.output_nonces);
    let err = stack.dispatcher.execute(task).await.unwrap_err();
    assert!(matches!(err, DispatchError::Remote { ref reason, .. } if reason.contains("reused")));

    Ok(())
}

/// Many concurrent callers on a small pool all get their own result.
#[tokio::test]
async fn test_concurrent_compares_through_pool() -> Result<()> {
    let stack = Stack::start(2).await?;
    let codec = stack.codec.clone();

    let mut handles = Vec::new();
    for i in 0..16u32 {
        let dispatcher = stack.dispatcher.clone();
        let task = ComputeTask::new(
            OP_COMPARE,
            vec![codec.encrypt_amount(i)?, codec.encrypt_amount(8)?],
        );
        handles.push(tokio::spawn(async move {
            assert!(dispatcher.in_flight() <= dispatcher.workers());
            let result = dispatcher.execute(task).await?;
            Ok::<_, DispatchError>((i, result))
        }));
    }

    for handle in handles {
        let (i, result) = handle.await??;
        let expected: &[u8] = match i.cmp(&8) {
            std::cmp::Ordering::Greater => b"1",
            std::cmp::Ordering::Equal => b"0",
            std::cmp::Ordering::Less => b"-1",
        };
        assert_eq!(result.plaintexts, vec![expected.to_vec()]);
    }
    assert_eq!(stack.dispatcher.in_flight(), 0);

    Ok(())
}

/// Remote rejections come back as errors and the pool keeps serving.
#[tokio::test]
async fn test_remote_error_is_reported() -> Result<()> {
    let stack = Stack::start(1).await?;

    let err = stack
        .dispatcher
        .execute(ComputeTask::new("sum", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Remote { .. }));

    let ok = stack
        .dispatcher
        .execute(ComputeTask::new(
            OP_COMPARE,
            vec![stack.codec.encrypt_amount(1)?, stack.codec.encrypt_amount(1)?],
        ))
        .await?;
    assert_eq!(ok.plaintexts, vec![b"0".to_vec()]);

    Ok(())
}

/// An unreachable service aborts dispatcher startup.
#[tokio::test]
async fn test_unreachable_service_is_fatal() -> Result<()> {
    let addr: SocketAddr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?
    };

    let config = DispatcherConfig {
        server_addr: format!("ws://{}", addr),
        workers: 2,
        call_timeout: Duration::from_secs(1),
    };
    let result = Dispatcher::connect(&config).await;
    assert!(matches!(result, Err(DispatchError::Connect { worker: 0, .. })));

    Ok(())
}
