//! Job executor: a fixed pool of workers draining the shared job queue.
//!
//! Each worker runs one job's pipeline at a time. Failed attempts go
//! through the backoff policy and are put back on the queue, so any
//! worker may pick up the retry.

use std::sync::Arc;
use std::time::Instant;

use revoice_models::{JobStatus, JobSubmission};
use revoice_queue::{JobHandle, JobQueue, QueuedJob};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::processor::JobPipeline;
use crate::retry::{BackoffPolicy, RetryDecision};

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: JobQueue,
    pipeline: Arc<JobPipeline>,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    /// Create an executor with its own queue sized from `config`.
    ///
    /// The queue keeps one retry slot per worker on top of its capacity.
    pub fn new(config: WorkerConfig, pipeline: Arc<JobPipeline>) -> Self {
        let mut queue_config = config.queue.clone();
        queue_config.retry_slots = queue_config.retry_slots.max(config.num_workers);
        let queue = JobQueue::new(queue_config);
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            queue,
            pipeline,
            shutdown,
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Enqueue a submission. Fails fast when the queue is full.
    pub fn submit(&self, submission: JobSubmission) -> WorkerResult<JobHandle> {
        let handle = self.queue.submit(submission)?;
        metrics::record_job_enqueued();
        info!(job_id = %handle.job_id(), "Job submitted");
        Ok(handle)
    }

    /// Run the worker pool until [`JobExecutor::shutdown`] is called.
    ///
    /// Workers finish their current job before exiting.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            workers = self.config.num_workers,
            capacity = self.queue.config().capacity,
            "Starting job executor"
        );

        let policy = self.config.backoff_policy();
        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.num_workers {
            let queue = self.queue.clone();
            let pipeline = Arc::clone(&self.pipeline);
            let shutdown_rx = self.shutdown.subscribe();
            workers.spawn(Self::worker_loop(worker_id, queue, pipeline, policy, shutdown_rx));
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Worker task failed: {}", e);
            }
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    async fn worker_loop(
        worker_id: usize,
        queue: JobQueue,
        pipeline: Arc<JobPipeline>,
        policy: BackoffPolicy,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        debug!(worker_id, "Worker started");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            let job = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
                job = queue.dequeue() => job,
            };
            match job {
                Some(job) => {
                    Self::execute_job(&queue, &pipeline, policy, job, &mut shutdown_rx).await
                }
                None => break,
            }
        }
        debug!(worker_id, "Worker stopped");
    }

    /// Run one attempt of `job` and settle its outcome.
    async fn execute_job(
        queue: &JobQueue,
        pipeline: &JobPipeline,
        policy: BackoffPolicy,
        mut job: QueuedJob,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        let started = Instant::now();
        let attempt = job.retries + 1;
        let logger = JobLogger::new(&job.job_id, "executor").with_attempt(attempt);

        if !advance(&mut job, JobStatus::Processing, &logger) {
            return;
        }

        match pipeline.run(&job.job_id, &job.submission, attempt).await {
            Ok(output) => {
                advance(&mut job, JobStatus::Completed, &logger);
                metrics::record_job_completed(started.elapsed().as_secs_f64());
                logger.log_completion(&output.display().to_string());

                // The pipeline already succeeded; a missed delivery is only logged.
                if let Err(e) = job.into_completion().deliver(output).await {
                    logger.log_warning(&format!("completion not delivered: {}", e));
                    metrics::record_delivery_failure();
                }
            }
            Err(e) if e.is_retryable() => match policy.decide(job.retries) {
                RetryDecision::Retry { retry, delay } => {
                    advance(&mut job, JobStatus::Retrying, &logger);
                    logger.log_warning(&format!(
                        "attempt failed, retry {}/{} in {:?}: {}",
                        retry, policy.max_retries, delay, e
                    ));
                    metrics::record_job_retried(retry);

                    let interrupted = tokio::select! {
                        _ = tokio::time::sleep(delay) => false,
                        _ = shutdown_requested(shutdown_rx) => true,
                    };
                    if interrupted {
                        // Dropping the job tells the requester it was abandoned
                        logger.log_warning("shutdown during backoff, retry abandoned");
                        metrics::record_job_failed("shutdown", started.elapsed().as_secs_f64());
                        return;
                    }

                    job.retries = retry;
                    advance(&mut job, JobStatus::Queued, &logger);
                    if let Err(qe) = queue.requeue(job) {
                        logger.log_error(&format!("requeue failed: {}", qe));
                        metrics::record_job_failed("requeue", started.elapsed().as_secs_f64());
                    }
                }
                RetryDecision::GiveUp => {
                    Self::fail(job, &logger, "retries_exhausted", &e, started);
                }
            },
            Err(e) => {
                let reason = if e.is_consistency_error() {
                    "consistency"
                } else {
                    "input"
                };
                Self::fail(job, &logger, reason, &e, started);
            }
        }
    }

    /// Mark `job` permanently failed. Dropping it closes its completion channels.
    fn fail(
        mut job: QueuedJob,
        logger: &JobLogger,
        reason: &'static str,
        err: &WorkerError,
        started: Instant,
    ) {
        advance(&mut job, JobStatus::Failed, logger);
        logger.log_error(&format!(
            "permanently failed after {} attempt(s) ({}): {}",
            job.retries + 1,
            reason,
            err
        ));
        metrics::record_job_failed(reason, started.elapsed().as_secs_f64());
        warn!(job_id = %job.job_id, file = %job.submission.file_name, "Job dropped");
    }
}

/// Resolve once shutdown is signalled or the executor is gone.
async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

fn advance(job: &mut QueuedJob, next: JobStatus, logger: &JobLogger) -> bool {
    match job.transition(next) {
        Ok(()) => true,
        Err(e) => {
            logger.log_error(&e.to_string());
            false
        }
    }
}
