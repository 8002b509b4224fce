//! Worker error types.

use std::path::PathBuf;

use revoice_media::{CodecPair, MediaError};
use revoice_models::{SlotError, TranscriptError};
use revoice_queue::QueueError;
use revoice_speech::SpeechError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    // Input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid transcript: {0}")]
    Transcript(#[from] TranscriptError),

    // Consistency errors
    #[error("Cut produced {produced} pieces, expected {expected}")]
    SegmentCountMismatch { expected: usize, produced: usize },

    #[error("Segment index {index} out of range for {len} segments")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Segment slot error: {0}")]
    Slot(#[from] SlotError),

    #[error("Segment {index} missing at {path}")]
    MissingSegment { index: usize, path: PathBuf },

    #[error("Segment {index} codecs {found} still differ from reference {expected} after re-encode")]
    CodecMismatch {
        index: usize,
        expected: CodecPair,
        found: CodecPair,
    },

    // Segment-level failure, classified by its cause
    #[error("Segment {index} failed: {source}")]
    SegmentFailed {
        index: usize,
        #[source]
        source: Box<WorkerError>,
    },

    #[error("Segment task failed: {0}")]
    TaskFailed(String),

    #[error("Manifest write failed: {0}")]
    Manifest(#[source] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Collaborator errors
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Speech service error: {0}")]
    Speech(#[from] SpeechError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Callback failed: {0}")]
    Callback(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn segment_failed(index: usize, source: WorkerError) -> Self {
        Self::SegmentFailed {
            index,
            source: Box::new(source),
        }
    }

    /// Check if error is retryable.
    ///
    /// Collaborator failures go through backoff; input and consistency
    /// errors fail the job immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::SegmentFailed { source, .. } => source.is_retryable(),
            WorkerError::Speech(e) => e.is_retryable(),
            WorkerError::Media(MediaError::FfmpegNotFound | MediaError::FfprobeNotFound) => false,
            WorkerError::Media(_)
            | WorkerError::Io(_)
            | WorkerError::Callback(_)
            | WorkerError::TaskFailed(_) => true,
            _ => false,
        }
    }

    /// Errors indicating a bookkeeping bug rather than bad input or a flaky collaborator.
    pub fn is_consistency_error(&self) -> bool {
        matches!(
            self,
            WorkerError::SegmentCountMismatch { .. }
                | WorkerError::IndexOutOfRange { .. }
                | WorkerError::Slot(_)
                | WorkerError::MissingSegment { .. }
                | WorkerError::CodecMismatch { .. }
        )
    }
}
