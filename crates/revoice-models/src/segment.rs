//! Video segments and the per-job ordered segment arena.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Whether a segment carries matched speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Voice,
    Gap,
}

impl SegmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::Voice => "voice",
            SegmentKind::Gap => "gap",
        }
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One contiguous slice of the source timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoSegment {
    /// Position in concatenation order (0-based, contiguous)
    pub index: usize,
    /// Segment file on disk
    pub path: PathBuf,
    pub kind: SegmentKind,
    /// Start on the source timeline, seconds
    pub start: f64,
    /// End on the source timeline, seconds
    pub end: f64,
}

impl VideoSegment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_voice(&self) -> bool {
        self.kind == SegmentKind::Voice
    }
}

/// Work order for one voice segment.
#[derive(Debug, Clone)]
pub struct SegmentJob {
    /// Transcript text to synthesize
    pub text: String,
    /// Segment file, rewritten in place
    pub video_path: PathBuf,
    /// Voice identifier for the synthesis service
    pub voice: String,
    /// Slot in the job's ordered segment list
    pub index: usize,
    /// Per-job scratch directory
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("segment index {index} out of range (len {len})")]
    OutOfRange { index: usize, len: usize },

    #[error("segment index {0} written twice")]
    AlreadyWritten(usize),

    #[error("segment index {0} is not a voice segment")]
    NotVoice(usize),
}

/// Fixed-size ordered segment list, pre-sized before fan-out.
///
/// Starts as a copy of the segmenter output. Each voice slot accepts
/// exactly one write; gap slots pass through unchanged.
#[derive(Debug, Clone)]
pub struct MergedSegments {
    slots: Vec<VideoSegment>,
    written: Vec<bool>,
}

impl MergedSegments {
    pub fn from_segments(all: &[VideoSegment]) -> Self {
        Self {
            slots: all.to_vec(),
            written: vec![false; all.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Record the processed file for a voice slot.
    pub fn write(&mut self, index: usize, path: PathBuf) -> Result<(), SlotError> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(SlotError::OutOfRange { index, len })?;
        if slot.kind != SegmentKind::Voice {
            return Err(SlotError::NotVoice(index));
        }
        if self.written[index] {
            return Err(SlotError::AlreadyWritten(index));
        }
        slot.path = path;
        self.written[index] = true;
        Ok(())
    }

    /// Number of voice slots that have been written.
    pub fn written_count(&self) -> usize {
        self.written.iter().filter(|w| **w).count()
    }

    pub fn segments(&self) -> &[VideoSegment] {
        &self.slots
    }

    /// Ordered paths for concatenation.
    pub fn into_paths(self) -> Vec<PathBuf> {
        self.slots.into_iter().map(|s| s.path).collect()
    }
}
