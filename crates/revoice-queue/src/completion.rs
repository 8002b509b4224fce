//! Completion signalling between a worker and the submitter.
//!
//! Each job carries a [`CompletionSender`]; the submitter keeps the matching
//! [`JobHandle`]. A done signal and the output path are each sent once,
//! each bounded by the delivery timeout. Dropping the sender without
//! delivering (permanent failure) resolves the handle with an error.

use std::path::PathBuf;
use std::time::Duration;

use revoice_models::JobId;
use tokio::sync::mpsc::{self, error::SendTimeoutError};

use crate::error::{QueueError, QueueResult};

/// Create a connected sender/handle pair for one job.
pub fn completion_pair(job_id: JobId, timeout: Duration) -> (CompletionSender, JobHandle) {
    let (done_tx, done_rx) = mpsc::channel(1);
    let (result_tx, result_rx) = mpsc::channel(1);
    (
        CompletionSender {
            done_tx,
            result_tx,
            timeout,
        },
        JobHandle {
            job_id,
            done_rx,
            result_rx,
        },
    )
}

/// Worker side of a job's completion channels.
#[derive(Debug)]
pub struct CompletionSender {
    done_tx: mpsc::Sender<()>,
    result_tx: mpsc::Sender<PathBuf>,
    timeout: Duration,
}

impl CompletionSender {
    /// Signal done, then hand over the output path.
    ///
    /// Consumes the sender: completion is delivered at most once.
    pub async fn deliver(self, output: PathBuf) -> QueueResult<()> {
        send_bounded(&self.done_tx, (), self.timeout, "done signal").await?;
        send_bounded(&self.result_tx, output, self.timeout, "output path").await
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

async fn send_bounded<T>(
    tx: &mpsc::Sender<T>,
    value: T,
    timeout: Duration,
    what: &'static str,
) -> QueueResult<()> {
    tx.send_timeout(value, timeout).await.map_err(|e| match e {
        SendTimeoutError::Timeout(_) => QueueError::DeliveryTimeout { what, timeout },
        SendTimeoutError::Closed(_) => QueueError::ReceiverGone(what),
    })
}

/// Submitter side of a job's completion channels.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    done_rx: mpsc::Receiver<()>,
    result_rx: mpsc::Receiver<PathBuf>,
}

impl JobHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Wait for the job to finish, returning the output path.
    ///
    /// Fails with [`QueueError::Abandoned`] when the job failed permanently.
    pub async fn wait(mut self) -> QueueResult<PathBuf> {
        self.done_rx
            .recv()
            .await
            .ok_or_else(|| QueueError::Abandoned(self.job_id.clone()))?;
        self.result_rx
            .recv()
            .await
            .ok_or_else(|| QueueError::Abandoned(self.job_id.clone()))
    }
}
