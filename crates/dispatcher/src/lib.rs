//! Confidential Compute Dispatcher
//!
//! Multiplexes contract callers onto a fixed set of persistent connections to
//! the enclave host:
//! 1. At startup, open one connection per worker (failure is fatal)
//! 2. Admit at most `N` tasks at a time; further callers wait
//! 3. Hand each admitted task to the next free worker in FIFO order
//! 4. Deliver the result, a remote error or a timeout to the caller's own slot
//!
//! There are no retries. A failed or timed-out call is reported once and the
//! worker moves on to the next task.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod rpc;

pub use config::DispatcherConfig;
pub use dispatcher::{ConfidentialCompute, Connector, Dispatcher, EnclaveConnection};
pub use error::DispatchError;
pub use rpc::{EnclaveApiClient, EnclaveApiServer, WsConnection, WsConnector};
