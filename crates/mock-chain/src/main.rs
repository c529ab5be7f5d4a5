//! Mock chain node for local testing of the enclave-backed contracts.
//!
//! Serves the auction and payment contracts over JSON-RPC on top of an
//! in-memory ledger. Every invocation runs in its own ledger transaction and
//! is committed only when the contract succeeds. Confidential operations go
//! through a dispatcher connected to the enclave service at startup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::Parser;
use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::Server;
use jsonrpsee::types::ErrorObjectOwned;
use parking_lot::RwLock;
use tracing::{info, warn};

use tee_dispatcher::config::parse_workers;
use tee_dispatcher::{ConfidentialCompute, Dispatcher, DispatcherConfig};
use tee_module::{
    invoke_auction, invoke_payment, AuctionContract, CallContext, ContractError, ErrorKind,
    Invocation, MemoryLedger, PaymentContract,
};
use tee_types::{Account, Auction, CreateAccountRequest, Schema, TransferRequest};

mod types;
use types::*;

#[derive(Parser)]
#[command(name = "mock-chain")]
#[command(about = "Mock ledger node for enclave-backed auctions and payments")]
struct Cli {
    /// Address to serve JSON-RPC on
    #[arg(long, env = "MOCK_CHAIN_LISTEN_ADDR", default_value = "127.0.0.1:9944")]
    listen: SocketAddr,

    /// WebSocket address of the confidential-compute service
    #[arg(long, env = "TEE_SERVER_ADDR")]
    tee_server_addr: Option<String>,

    /// Number of enclave connections and workers
    #[arg(long, env = "TEE_WORKERS")]
    tee_workers: Option<String>,

    /// Per-call timeout in seconds
    #[arg(long, env = "TEE_CALL_TIMEOUT_SECS", default_value = "10")]
    call_timeout_secs: u64,
}

impl Cli {
    fn dispatcher_config(&self) -> DispatcherConfig {
        let mut config = DispatcherConfig::default();
        if let Some(addr) = self.tee_server_addr.as_ref().filter(|a| !a.is_empty()) {
            config.server_addr = addr.clone();
        }
        config.workers = parse_workers(self.tee_workers.as_deref());
        config.call_timeout = Duration::from_secs(self.call_timeout_secs);
        config
    }
}

/// Simulated chain clock. Follows wall time unless pinned.
#[derive(Debug, Default)]
struct Clock {
    pinned: Option<u64>,
}

impl Clock {
    fn now(&self) -> u64 {
        self.pinned.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default()
        })
    }
}

/// RPC API definition for the mock chain.
#[rpc(server)]
pub trait MockChainApi {
    // ============ Admin Methods ============

    /// Pin the chain clock (for testing time-dependent logic).
    #[method(name = "admin_setTimestamp")]
    async fn admin_set_timestamp(&self, timestamp: u64) -> Result<bool, ErrorObjectOwned>;

    /// Get current height and clock.
    #[method(name = "chain_getInfo")]
    async fn chain_get_info(&self) -> Result<ChainInfo, ErrorObjectOwned>;

    /// Submit a raw invocation. Returns the response payload as a string.
    #[method(name = "chain_invoke")]
    async fn chain_invoke(
        &self,
        chaincode: Chaincode,
        invocation: Invocation,
    ) -> Result<String, ErrorObjectOwned>;

    // ============ Auction Methods ============

    /// Create a new auction. Returns its id.
    #[method(name = "auction_create")]
    async fn auction_create(&self, params: CreateAuctionParams) -> Result<String, ErrorObjectOwned>;

    /// Submit a sealed bid. Returns the bid id.
    #[method(name = "auction_bid")]
    async fn auction_bid(&self, params: BidParams) -> Result<String, ErrorObjectOwned>;

    /// Determine the winner. Returns the end summary.
    #[method(name = "auction_end")]
    async fn auction_end(&self, auction_id: String) -> Result<String, ErrorObjectOwned>;

    /// Get auction by id.
    #[method(name = "auction_query")]
    async fn auction_query(&self, auction_id: String) -> Result<Auction, ErrorObjectOwned>;

    // ============ Payment Methods ============

    /// Open an account with a sealed balance.
    #[method(name = "payment_create")]
    async fn payment_create(&self, request: CreateAccountRequest) -> Result<bool, ErrorObjectOwned>;

    /// Transfer a sealed amount.
    #[method(name = "payment_transfer")]
    async fn payment_transfer(&self, request: TransferRequest) -> Result<bool, ErrorObjectOwned>;

    /// Get the sealed account record.
    #[method(name = "payment_query")]
    async fn payment_query(&self, account_id: String) -> Result<Account, ErrorObjectOwned>;
}

/// Implementation of the mock chain RPC server.
struct MockChainServer {
    ledger: Arc<MemoryLedger>,
    clock: RwLock<Clock>,
    auction: AuctionContract,
    payment: PaymentContract,
}

impl MockChainServer {
    fn new(compute: Arc<dyn ConfidentialCompute>) -> Self {
        Self {
            ledger: Arc::new(MemoryLedger::new()),
            clock: RwLock::new(Clock::default()),
            auction: AuctionContract::new(compute.clone()),
            payment: PaymentContract::new(compute),
        }
    }

    fn make_context(&self) -> CallContext {
        CallContext {
            timestamp: self.clock.read().now(),
        }
    }

    async fn invoke(
        &self,
        chaincode: Chaincode,
        invocation: &Invocation,
    ) -> Result<Vec<u8>, ErrorObjectOwned> {
        let result = match chaincode {
            Chaincode::Auction => {
                let ctx = self.make_context();
                invoke_auction(&self.ledger, &self.auction, &ctx, invocation).await
            }
            Chaincode::Payment => invoke_payment(&self.ledger, &self.payment, invocation).await,
        };
        result.map_err(|e| {
            warn!(?chaincode, function = %invocation.function, error = %e, "Invocation failed");
            Self::contract_error(&e)
        })
    }

    fn contract_error(err: &ContractError) -> ErrorObjectOwned {
        let code = match err.kind() {
            ErrorKind::Validation => -32602,
            ErrorKind::Gateway => -32001,
            ErrorKind::Compute => -32002,
        };
        ErrorObjectOwned::owned(code, err.to_string(), None::<()>)
    }

    fn rpc_error(msg: &str) -> ErrorObjectOwned {
        ErrorObjectOwned::owned(-32000, msg.to_string(), None::<()>)
    }

    fn utf8(payload: Vec<u8>) -> Result<String, ErrorObjectOwned> {
        String::from_utf8(payload).map_err(|e| Self::rpc_error(&format!("Invalid payload: {}", e)))
    }
}

#[async_trait]
impl MockChainApiServer for MockChainServer {
    async fn admin_set_timestamp(&self, timestamp: u64) -> Result<bool, ErrorObjectOwned> {
        self.clock.write().pinned = Some(timestamp);
        info!("Timestamp set to {}", timestamp);
        Ok(true)
    }

    async fn chain_get_info(&self) -> Result<ChainInfo, ErrorObjectOwned> {
        let clock = self.clock.read();
        Ok(ChainInfo {
            height: self.ledger.height(),
            timestamp: clock.now(),
            pinned: clock.pinned.is_some(),
        })
    }

    async fn chain_invoke(
        &self,
        chaincode: Chaincode,
        invocation: Invocation,
    ) -> Result<String, ErrorObjectOwned> {
        let payload = self.invoke(chaincode, &invocation).await?;
        Ok(String::from_utf8(payload).unwrap_or_else(|e| hex::encode(e.into_bytes())))
    }

    async fn auction_create(
        &self,
        params: CreateAuctionParams,
    ) -> Result<String, ErrorObjectOwned> {
        let invocation = Invocation::new(
            "create",
            [
                params.start.to_string(),
                params.end.to_string(),
                params.starting_bid.to_string(),
            ],
        );
        Self::utf8(self.invoke(Chaincode::Auction, &invocation).await?)
    }

    async fn auction_bid(&self, params: BidParams) -> Result<String, ErrorObjectOwned> {
        let invocation = Invocation::new(
            "bid",
            [
                params.auction_id,
                params.cert,
                hex::encode(&params.value.content),
                hex::encode(params.value.nonce),
            ],
        );
        Self::utf8(self.invoke(Chaincode::Auction, &invocation).await?)
    }

    async fn auction_end(&self, auction_id: String) -> Result<String, ErrorObjectOwned> {
        let invocation = Invocation::new("end", [auction_id]);
        Self::utf8(self.invoke(Chaincode::Auction, &invocation).await?)
    }

    async fn auction_query(&self, auction_id: String) -> Result<Auction, ErrorObjectOwned> {
        let invocation = Invocation::new("query", [auction_id]);
        let raw = self.invoke(Chaincode::Auction, &invocation).await?;
        Auction::decode(&raw).map_err(|e| Self::rpc_error(&e.to_string()))
    }

    async fn payment_create(
        &self,
        request: CreateAccountRequest,
    ) -> Result<bool, ErrorObjectOwned> {
        let payload = serde_json::to_string(&request).map_err(|e| Self::rpc_error(&e.to_string()))?;
        self.invoke(Chaincode::Payment, &Invocation::new("create", [payload]))
            .await?;
        Ok(true)
    }

    async fn payment_transfer(&self, request: TransferRequest) -> Result<bool, ErrorObjectOwned> {
        let payload = serde_json::to_string(&request).map_err(|e| Self::rpc_error(&e.to_string()))?;
        self.invoke(Chaincode::Payment, &Invocation::new("transfer", [payload]))
            .await?;
        Ok(true)
    }

    async fn payment_query(&self, account_id: String) -> Result<Account, ErrorObjectOwned> {
        let raw = self
            .invoke(Chaincode::Payment, &Invocation::new("query", [account_id]))
            .await?;
        Account::decode(&raw).map_err(|e| Self::rpc_error(&e.to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mock_chain=info".parse()?)
                .add_directive("tee_module=info".parse()?)
                .add_directive("tee_dispatcher=info".parse()?)
                .add_directive("jsonrpsee=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.dispatcher_config();

    info!("Connecting {} workers to {}", config.workers, config.server_addr);
    let dispatcher = Dispatcher::connect(&config)
        .await
        .context("failed to connect to the confidential-compute service")?;
    let compute: Arc<dyn ConfidentialCompute> = Arc::new(dispatcher);

    info!("Starting mock chain server on {}", cli.listen);

    let server = Server::builder().build(cli.listen).await?;
    let handle = server.start(MockChainServer::new(compute).into_rpc());

    info!("Mock chain server running. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    handle.stop()?;
    handle.stopped().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tee_crypto::Codec;
    use tee_dispatcher::DispatchError;
    use tee_types::{Comparison, ComputeResult, ComputeTask};

    /// Compares two sealed amounts in the clear.
    struct ClearCompare(Codec);

    #[async_trait]
    impl ConfidentialCompute for ClearCompare {
        async fn execute(&self, task: ComputeTask) -> Result<ComputeResult, DispatchError> {
            let a = self.0.decrypt_amount(&task.feeds[0]).unwrap();
            let b = self.0.decrypt_amount(&task.feeds[1]).unwrap();
            let comparison = match a.cmp(&b) {
                std::cmp::Ordering::Greater => Comparison::Greater,
                std::cmp::Ordering::Equal => Comparison::Equal,
                std::cmp::Ordering::Less => Comparison::Less,
            };
            Ok(ComputeResult {
                plaintexts: vec![comparison.as_plaintext().to_vec()],
                reencrypted_feeds: Vec::new(),
            })
        }
    }

    fn server() -> MockChainServer {
        MockChainServer::new(Arc::new(ClearCompare(Codec::demo())))
    }

    #[tokio::test]
    async fn test_auction_over_rpc_methods() {
        let server = server();
        let codec = Codec::demo();
        server.admin_set_timestamp(50).await.unwrap();

        let id = server
            .auction_create(CreateAuctionParams {
                start: 100,
                end: 200,
                starting_bid: 1,
            })
            .await
            .unwrap();

        // Too early.
        let err = server
            .auction_bid(BidParams {
                auction_id: id.clone(),
                cert: "cert".into(),
                value: codec.encrypt_amount(5).unwrap(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), -32602);

        server.admin_set_timestamp(150).await.unwrap();
        let mut bid_ids = Vec::new();
        for amount in [5u32, 9, 7] {
            bid_ids.push(
                server
                    .auction_bid(BidParams {
                        auction_id: id.clone(),
                        cert: "cert".into(),
                        value: codec.encrypt_amount(amount).unwrap(),
                    })
                    .await
                    .unwrap(),
            );
        }

        let summary = server.auction_end(id.clone()).await.unwrap();
        assert!(summary.starts_with(&format!("the winner bid id is {}", bid_ids[1])));

        let auction = server.auction_query(id).await.unwrap();
        assert_eq!(auction.winner, bid_ids[1]);
        assert!(auction.ended);

        let info = server.chain_get_info().await.unwrap();
        assert_eq!(info.height, 5);
        assert_eq!(info.timestamp, 150);
        assert!(info.pinned);
    }

    #[tokio::test]
    async fn test_unknown_function_is_invalid_params() {
        let server = server();
        let err = server
            .chain_invoke(Chaincode::Payment, Invocation::new("mint", ["1"]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), -32602);
        assert!(err.message().contains("Unsupported function mint"));
    }

    #[tokio::test]
    async fn test_missing_account_is_gateway_error() {
        let err = server().payment_query("nobody".into()).await.unwrap_err();
        assert_eq!(err.code(), -32001);
    }

    #[test]
    fn test_cli_worker_fallback() {
        let cli = Cli::parse_from(["mock-chain", "--tee-workers", "zero"]);
        let config = cli.dispatcher_config();
        assert_eq!(config.workers, 10);
        assert_eq!(config.call_timeout, Duration::from_secs(10));

        let cli = Cli::parse_from([
            "mock-chain",
            "--tee-server-addr",
            "ws://127.0.0.1:20000",
            "--tee-workers",
            "4",
        ]);
        let config = cli.dispatcher_config();
        assert_eq!(config.server_addr, "ws://127.0.0.1:20000");
        assert_eq!(config.workers, 4);
    }
}
