//! JSON-RPC surface of the confidential-compute service and its WebSocket
//! connector.

use std::time::Duration;

use async_trait::async_trait;
use jsonrpsee::core::{ClientError, RpcResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use tracing::debug;

use tee_types::{ComputeResult, ComputeTask};

use crate::dispatcher::{Connector, EnclaveConnection};
use crate::error::DispatchError;

/// RPC API exposed by the enclave host.
#[rpc(client, server, namespace = "enclave")]
pub trait EnclaveApi {
    /// Open the feeds, run the selected operation and return plaintext and
    /// re-sealed outputs.
    #[method(name = "execute")]
    async fn execute(&self, task: ComputeTask) -> RpcResult<ComputeResult>;
}

/// Opens persistent WebSocket connections to the enclave host.
///
/// The worker's `call_timeout` is the deadline for a call. The client's own
/// request timeout is set well past it and only backs it up.
#[derive(Debug, Clone)]
pub struct WsConnector {
    addr: String,
    call_timeout: Duration,
}

impl WsConnector {
    pub fn new(addr: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            call_timeout,
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Connection = WsConnection;

    async fn connect(&self, worker: usize) -> Result<WsConnection, DispatchError> {
        debug!(worker, addr = %self.addr, "dialing enclave");
        let client = WsClientBuilder::default()
            .request_timeout(self.call_timeout.saturating_mul(2))
            .build(&self.addr)
            .await
            .map_err(|e| DispatchError::Connect {
                worker,
                addr: self.addr.clone(),
                reason: e.to_string(),
            })?;
        Ok(WsConnection {
            client,
            call_timeout: self.call_timeout,
        })
    }
}

/// One persistent connection, owned by exactly one worker.
pub struct WsConnection {
    client: WsClient,
    call_timeout: Duration,
}

#[async_trait]
impl EnclaveConnection for WsConnection {
    async fn call(&mut self, task: ComputeTask) -> Result<ComputeResult, DispatchError> {
        let operation = task.operation.clone();
        EnclaveApiClient::execute(&self.client, task)
            .await
            .map_err(|e| client_error(operation, e, self.call_timeout))
    }
}

fn client_error(operation: String, err: ClientError, call_timeout: Duration) -> DispatchError {
    match err {
        ClientError::RequestTimeout => DispatchError::Timeout {
            operation,
            after: call_timeout,
        },
        other => DispatchError::Remote {
            operation,
            reason: other.to_string(),
        },
    }
}
