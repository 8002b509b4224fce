//! Dubbing worker.
//!
//! This crate provides:
//! - Transcript segmentation, per-segment re-voicing and reassembly
//! - A fixed worker pool with bounded retry and exponential backoff
//! - Completion webhooks and Prometheus metrics
//! - Graceful shutdown

pub mod callback;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod processor;
pub mod retry;
pub mod workdir;

#[cfg(test)]
mod test_support;

pub use callback::CallbackNotifier;
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use processor::JobPipeline;
pub use retry::{BackoffPolicy, RetryDecision};
pub use workdir::JobWorkspace;
