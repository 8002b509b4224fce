//! Queue envelope for a submitted job.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use revoice_models::{InvalidTransition, JobId, JobStatus, JobSubmission};

use crate::completion::CompletionSender;

/// A job as it travels through the queue.
///
/// Retries re-enqueue the same value with `retries` incremented, so the
/// completion channels follow the job to whichever worker picks it up.
#[derive(Debug)]
pub struct QueuedJob {
    pub job_id: JobId,
    pub submission: JobSubmission,
    /// Attempts that have failed so far
    pub retries: u32,
    status: JobStatus,
    pub enqueued_at: DateTime<Utc>,
    completion: CompletionSender,
    slot: Option<JobSlot>,
}

impl QueuedJob {
    pub fn new(job_id: JobId, submission: JobSubmission, completion: CompletionSender) -> Self {
        Self {
            job_id,
            submission,
            retries: 0,
            status: JobStatus::Queued,
            enqueued_at: Utc::now(),
            completion,
            slot: None,
        }
    }

    pub(crate) fn with_slot(mut self, slot: JobSlot) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Advance the job's state machine.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        self.status = self.status.transition(next)?;
        Ok(())
    }

    /// Take the completion sender, consuming the job.
    ///
    /// The job's live slot is released here.
    pub fn into_completion(self) -> CompletionSender {
        self.completion
    }
}

/// One unit of a queue's live-job count, released on drop.
#[derive(Debug)]
pub(crate) struct JobSlot(Arc<AtomicUsize>);

impl JobSlot {
    /// Take a slot if fewer than `limit` are held.
    pub(crate) fn acquire(live: &Arc<AtomicUsize>, limit: usize) -> Option<Self> {
        live.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            (n < limit).then_some(n + 1)
        })
        .ok()?;
        Some(Self(Arc::clone(live)))
    }
}

impl Drop for JobSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
