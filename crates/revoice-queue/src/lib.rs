//! In-process job queue shared by the worker pool.
//!
//! This crate provides:
//! - A bounded multi-consumer queue of [`QueuedJob`]s
//! - Per-job completion handles (done signal + output path)
//! - Timed delivery so a worker never blocks on a departed requester

pub mod completion;
pub mod error;
pub mod job;
pub mod queue;

pub use completion::{completion_pair, CompletionSender, JobHandle};
pub use error::{QueueError, QueueResult};
pub use job::QueuedJob;
pub use queue::{JobQueue, QueueConfig};
