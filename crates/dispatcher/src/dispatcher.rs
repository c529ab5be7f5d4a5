//! Bounded worker pool in front of the confidential-compute service.
//!
//! `N` workers each own one connection and drain a single FIFO queue of
//! capacity `N`. Admission is gated by `N` permits that are held until the
//! remote call finishes, so at most `N` tasks are ever admitted and at most
//! `N` remote calls are ever in flight. A caller that cannot get a permit
//! waits; that wait is the only backpressure in the system.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tee_types::{ComputeResult, ComputeTask};

use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::rpc::WsConnector;

/// Anything that can run a compute task to completion.
///
/// Contracts depend on this trait rather than on [`Dispatcher`] so tests can
/// substitute a scripted implementation.
#[async_trait]
pub trait ConfidentialCompute: Send + Sync {
    async fn execute(&self, task: ComputeTask) -> Result<ComputeResult, DispatchError>;
}

/// A single connection to the enclave. Calls are issued one at a time.
#[async_trait]
pub trait EnclaveConnection: Send + 'static {
    async fn call(&mut self, task: ComputeTask) -> Result<ComputeResult, DispatchError>;
}

/// Factory for worker connections.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: EnclaveConnection;

    async fn connect(&self, worker: usize) -> Result<Self::Connection, DispatchError>;
}

type Reply = oneshot::Sender<Result<ComputeResult, DispatchError>>;

/// A queued task with its private result slot.
struct Job {
    task: ComputeTask,
    reply: Reply,
    permit: OwnedSemaphorePermit,
    admitted_at: Instant,
}

/// The dispatcher. Construct one at startup and share it by `Arc`.
pub struct Dispatcher {
    queue: mpsc::Sender<Job>,
    admission: Arc<Semaphore>,
    workers: usize,
    handles: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Connect to the configured WebSocket endpoint and start the pool.
    pub async fn connect(config: &DispatcherConfig) -> Result<Self, DispatchError> {
        let connector = WsConnector::new(config.server_addr.clone(), config.call_timeout);
        Self::start(config, connector).await
    }

    /// Open one connection per worker and spawn the worker loops.
    ///
    /// Any connection failure aborts startup.
    pub async fn start<C: Connector>(
        config: &DispatcherConfig,
        connector: C,
    ) -> Result<Self, DispatchError> {
        let workers = config.workers.max(1);

        let mut connections = Vec::with_capacity(workers);
        for worker in 0..workers {
            connections.push(connector.connect(worker).await?);
        }

        let (queue, receiver) = mpsc::channel(workers);
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = connections
            .into_iter()
            .enumerate()
            .map(|(worker, connection)| {
                tokio::spawn(run_worker(
                    worker,
                    connection,
                    receiver.clone(),
                    config.call_timeout,
                ))
            })
            .collect();

        info!(
            workers,
            addr = %config.server_addr,
            timeout = ?config.call_timeout,
            "Dispatcher started"
        );

        Ok(Self {
            queue,
            admission: Arc::new(Semaphore::new(workers)),
            workers,
            handles,
        })
    }

    /// Number of workers, which is also the admission bound.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Tasks currently admitted (queued or executing).
    pub fn in_flight(&self) -> usize {
        self.workers - self.admission.available_permits()
    }

    /// Stop accepting work and wait for the workers to drain.
    pub async fn shutdown(self) {
        self.admission.close();
        drop(self.queue);
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("Dispatcher stopped");
    }

    /// Submit a task and wait for its result.
    pub async fn submit(&self, task: ComputeTask) -> Result<ComputeResult, DispatchError> {
        let permit = self
            .admission
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::Closed)?;

        let operation = task.operation.clone();
        let (reply, slot) = oneshot::channel();
        let job = Job {
            task,
            reply,
            permit,
            admitted_at: Instant::now(),
        };

        self.queue.send(job).await.map_err(|_| DispatchError::Closed)?;

        slot.await
            .map_err(|_| DispatchError::ResultLost(operation))?
    }
}

#[async_trait]
impl ConfidentialCompute for Dispatcher {
    async fn execute(&self, task: ComputeTask) -> Result<ComputeResult, DispatchError> {
        self.submit(task).await
    }
}

async fn run_worker<C: EnclaveConnection>(
    worker: usize,
    mut connection: C,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    call_timeout: Duration,
) {
    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(job) = job else {
            debug!(worker, "Queue closed, worker exiting");
            return;
        };

        let Job {
            task,
            reply,
            permit,
            admitted_at,
        } = job;
        let operation = task.operation.clone();
        let feeds = task.feeds.len();

        let result = match tokio::time::timeout(call_timeout, connection.call(task)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout {
                operation: operation.clone(),
                after: call_timeout,
            }),
        };

        match &result {
            Ok(output) => debug!(
                worker,
                operation = %operation,
                feeds,
                outputs = output.reencrypted_feeds.len(),
                elapsed = ?admitted_at.elapsed(),
                "Remote call completed"
            ),
            Err(e) => warn!(worker, operation = %operation, error = %e, "Remote call failed"),
        }

        drop(permit);
        if reply.send(result).is_err() {
            debug!(worker, operation = %operation, "Caller went away before the result");
        }
    }
}
