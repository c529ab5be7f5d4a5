//! Dispatcher error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while dispatching work to the enclave.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Opening a worker connection failed. Fatal at startup.
    #[error("Worker {worker} failed to connect to {addr}: {reason}")]
    Connect {
        worker: usize,
        addr: String,
        reason: String,
    },

    #[error("Remote {operation} failed: {reason}")]
    Remote { operation: String, reason: String },

    #[error("Remote {operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Dispatcher is shut down")]
    Closed,

    #[error("Worker dropped the result slot for {0}")]
    ResultLost(String),
}
