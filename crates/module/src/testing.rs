//! Test doubles for the confidential-compute backend.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use tee_crypto::Codec;
use tee_dispatcher::{ConfidentialCompute, DispatchError};
use tee_types::{ComputeResult, ComputeTask, Comparison};

type Responder = dyn Fn(&ComputeTask) -> Result<ComputeResult, DispatchError> + Send + Sync;

/// Scripted, call-recording [`ConfidentialCompute`].
pub struct FakeCompute {
    calls: Mutex<Vec<ComputeTask>>,
    responder: Box<Responder>,
}

impl FakeCompute {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&ComputeTask) -> Result<ComputeResult, DispatchError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        })
    }

    /// Opens both feeds with the demo key and compares them as amounts.
    pub fn comparing() -> Arc<Self> {
        let codec = Codec::demo();
        Self::new(move |task| {
            let challenger = codec.decrypt_amount(&task.feeds[0]).unwrap();
            let baseline = codec.decrypt_amount(&task.feeds[1]).unwrap();
            let comparison = match challenger.cmp(&baseline) {
                std::cmp::Ordering::Greater => Comparison::Greater,
                std::cmp::Ordering::Equal => Comparison::Equal,
                std::cmp::Ordering::Less => Comparison::Less,
            };
            Ok(ComputeResult {
                plaintexts: vec![comparison.as_plaintext().to_vec()],
                reencrypted_feeds: Vec::new(),
            })
        })
    }

    /// Fails every call with a remote error.
    pub fn failing() -> Arc<Self> {
        Self::new(|task| {
            Err(DispatchError::Remote {
                operation: task.operation.clone(),
                reason: "enclave unavailable".into(),
            })
        })
    }

    pub fn calls(&self) -> Vec<ComputeTask> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ConfidentialCompute for FakeCompute {
    async fn execute(&self, task: ComputeTask) -> Result<ComputeResult, DispatchError> {
        self.calls.lock().push(task.clone());
        (self.responder)(&task)
    }
}
