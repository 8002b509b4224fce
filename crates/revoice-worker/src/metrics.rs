//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_ENQUEUED_TOTAL: &str = "revoice_jobs_enqueued_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "revoice_jobs_completed_total";
    pub const JOBS_RETRIED_TOTAL: &str = "revoice_jobs_retried_total";
    pub const JOBS_FAILED_TOTAL: &str = "revoice_jobs_failed_total";
    pub const DELIVERY_FAILURES_TOTAL: &str = "revoice_delivery_failures_total";
    pub const SEGMENTS_PROCESSED_TOTAL: &str = "revoice_segments_processed_total";
    pub const PIPELINE_DURATION_SECONDS: &str = "revoice_pipeline_duration_seconds";
    pub use revoice_media::command::MEDIA_TOOL_DURATION_SECONDS;
}

/// Serve `/metrics` on `addr` and install the global recorder.
pub fn install_prometheus(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

pub fn record_job_enqueued() {
    counter!(names::JOBS_ENQUEUED_TOTAL).increment(1);
}

pub fn record_job_completed(duration_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::PIPELINE_DURATION_SECONDS, "outcome" => "completed").record(duration_secs);
}

pub fn record_job_retried(retry: u32) {
    counter!(names::JOBS_RETRIED_TOTAL, "retry" => retry.to_string()).increment(1);
}

pub fn record_job_failed(reason: &'static str, duration_secs: f64) {
    counter!(names::JOBS_FAILED_TOTAL, "reason" => reason).increment(1);
    histogram!(names::PIPELINE_DURATION_SECONDS, "outcome" => "failed").record(duration_secs);
}

pub fn record_delivery_failure() {
    counter!(names::DELIVERY_FAILURES_TOTAL).increment(1);
}

pub fn record_segments_processed(kind: &'static str, count: usize) {
    counter!(names::SEGMENTS_PROCESSED_TOTAL, "kind" => kind).increment(count as u64);
}
