//! Shared data models for the revoice pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Job submissions, identifiers and the job state machine
//! - Transcript intervals and word timestamps
//! - Timeline segments and the per-job merged segment arena
//! - Completion webhook payloads

pub mod job;
pub mod segment;
pub mod transcript;

// Re-export common types
pub use job::{CompletionPayload, InvalidTransition, JobId, JobStatus, JobSubmission};
pub use segment::{MergedSegments, SegmentJob, SegmentKind, SlotError, VideoSegment};
pub use transcript::{
    NormalizedIntervals, Transcript, TranscriptError, TranscriptInterval, WordTimestamp,
};
