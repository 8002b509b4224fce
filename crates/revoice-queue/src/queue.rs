//! Bounded in-process job queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use revoice_models::{JobId, JobSubmission};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::completion::{completion_pair, JobHandle};
use crate::error::{QueueError, QueueResult};
use crate::job::{JobSlot, QueuedJob};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum jobs waiting to be picked up
    pub capacity: usize,
    /// Extra room held back for jobs coming back from a failed attempt
    pub retry_slots: usize,
    /// Bound on each completion send
    pub delivery_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            retry_slots: 0,
            delivery_timeout: Duration::from_secs(5),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity: std::env::var("WORKER_QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|c| *c > 0)
                .unwrap_or(defaults.capacity),
            retry_slots: std::env::var("WORKER_QUEUE_RETRY_SLOTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.retry_slots),
            delivery_timeout: std::env::var("WORKER_DELIVERY_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.delivery_timeout),
        }
    }
}

/// Multi-producer, multi-consumer bounded queue.
///
/// Workers share the receiver behind a mutex, so each job is handed to
/// exactly one worker.
///
/// Every admitted job holds a live slot until it settles, whether it is
/// waiting, running or backing off. Live jobs never outnumber the channel
/// size, so a job being put back always finds room.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<QueuedJob>,
    rx: Arc<Mutex<mpsc::Receiver<QueuedJob>>>,
    live: Arc<AtomicUsize>,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity.max(1) + config.retry_slots);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            live: Arc::new(AtomicUsize::new(0)),
            config,
        }
    }

    pub fn from_env() -> Self {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Enqueue a new submission without waiting for space.
    pub fn submit(&self, submission: JobSubmission) -> QueueResult<JobHandle> {
        let full = QueueError::QueueFull(self.config.capacity);
        if self.depth() >= self.config.capacity {
            return Err(full);
        }
        let slot = JobSlot::acquire(&self.live, self.tx.max_capacity()).ok_or(full)?;

        let job_id = JobId::new();
        let (completion, handle) = completion_pair(job_id.clone(), self.config.delivery_timeout);
        let job = QueuedJob::new(job_id, submission, completion).with_slot(slot);
        self.send_now(job)?;

        debug!(job_id = %handle.job_id(), depth = self.depth(), "Job enqueued");
        Ok(handle)
    }

    /// Put a job back for any worker to pick up.
    ///
    /// Never waits: the job still holds its live slot, so the channel has
    /// room for it.
    pub fn requeue(&self, job: QueuedJob) -> QueueResult<()> {
        let job_id = job.job_id.clone();
        self.send_now(job)?;
        debug!(job_id = %job_id, depth = self.depth(), "Job requeued");
        Ok(())
    }

    fn send_now(&self, job: QueuedJob) -> QueueResult<()> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::QueueFull(self.config.capacity),
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Wait for the next job.
    ///
    /// Returns `None` only when every sender is gone.
    pub async fn dequeue(&self) -> Option<QueuedJob> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    /// Jobs currently waiting.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Jobs admitted and not yet settled.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revoice_models::JobStatus;

    fn queue(capacity: usize) -> JobQueue {
        queue_with_retry_slots(capacity, 0)
    }

    fn queue_with_retry_slots(capacity: usize, retry_slots: usize) -> JobQueue {
        JobQueue::new(QueueConfig {
            capacity,
            retry_slots,
            delivery_timeout: Duration::from_millis(100),
        })
    }

    #[tokio::test]
    async fn test_submit_and_dequeue_fifo() {
        let q = queue(4);
        let a = q.submit(JobSubmission::new("/in/a.mp4", "k")).unwrap();
        let b = q.submit(JobSubmission::new("/in/b.mp4", "k")).unwrap();
        assert_eq!(q.depth(), 2);

        let first = q.dequeue().await.unwrap();
        let second = q.dequeue().await.unwrap();
        assert_eq!(&first.job_id, a.job_id());
        assert_eq!(&second.job_id, b.job_id());
        assert_eq!(first.status(), JobStatus::Queued);
        assert_eq!(q.depth(), 0);
    }

    #[tokio::test]
    async fn test_submit_full_queue() {
        let q = queue(1);
        let _a = q.submit(JobSubmission::new("/in/a.mp4", "k")).unwrap();
        let err = q.submit(JobSubmission::new("/in/b.mp4", "k")).unwrap_err();
        assert!(matches!(err, QueueError::QueueFull(1)));
    }

    #[tokio::test]
    async fn test_requeue_keeps_identity_and_retries() {
        let q = queue(2);
        let handle = q.submit(JobSubmission::new("/in/a.mp4", "k")).unwrap();

        let mut job = q.dequeue().await.unwrap();
        job.retries += 1;
        q.requeue(job).unwrap();

        let again = q.dequeue().await.unwrap();
        assert_eq!(&again.job_id, handle.job_id());
        assert_eq!(again.retries, 1);
    }

    #[tokio::test]
    async fn test_each_job_dequeued_once() {
        let q = queue(16);
        for i in 0..10 {
            q.submit(JobSubmission::new(format!("/in/{}.mp4", i), "k"))
                .unwrap();
        }

        let mut tasks = Vec::new();
        for _ in 0..3 {
            let q = q.clone();
            tasks.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Ok(Some(job)) =
                    tokio::time::timeout(Duration::from_millis(50), q.dequeue()).await
                {
                    seen.push(job.job_id);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for t in tasks {
            all.extend(t.await.unwrap());
        }
        all.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        all.dedup();
        assert_eq!(all.len(), 10);
    }

    #[tokio::test]
    async fn test_requeue_fits_behind_new_submission() {
        let q = queue_with_retry_slots(1, 1);
        let _a = q.submit(JobSubmission::new("/in/a.mp4", "k")).unwrap();
        let running = q.dequeue().await.unwrap();

        let _b = q.submit(JobSubmission::new("/in/b.mp4", "k")).unwrap();
        let err = q.submit(JobSubmission::new("/in/c.mp4", "k")).unwrap_err();
        assert!(matches!(err, QueueError::QueueFull(1)));

        q.requeue(running).unwrap();
        assert_eq!(q.depth(), 2);
        assert_eq!(q.live(), 2);
    }

    #[tokio::test]
    async fn test_running_jobs_hold_their_slot() {
        let q = queue(1);
        let _a = q.submit(JobSubmission::new("/in/a.mp4", "k")).unwrap();
        let running = q.dequeue().await.unwrap();
        assert_eq!(q.depth(), 0);

        // The running job may still come back, so no new job is admitted
        let err = q.submit(JobSubmission::new("/in/b.mp4", "k")).unwrap_err();
        assert!(matches!(err, QueueError::QueueFull(1)));
        q.requeue(running).unwrap();

        let settled = q.dequeue().await.unwrap();
        drop(settled);
        assert_eq!(q.live(), 0);
        q.submit(JobSubmission::new("/in/b.mp4", "k")).unwrap();
    }

    #[test]
    fn test_config_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.capacity, 100);
        assert_eq!(config.retry_slots, 0);
        assert_eq!(config.delivery_timeout, Duration::from_secs(5));
    }
}
