//! Transcript data and timing validation.
//!
//! Intervals come from the transcription service in seconds. Before the
//! segmenter sees them they are checked against the probed video duration
//! with [`Transcript::normalized`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Maximum reasonable video duration (24 hours in seconds).
pub const MAX_VIDEO_DURATION_SECS: f64 = 86400.0;

/// One sentence-level span of recognized speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptInterval {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Recognized text
    pub text: String,
}

impl TranscriptInterval {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Word-level timing, when the transcription service provides it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WordTimestamp {
    pub word: String,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub probability: f64,
}

/// Full transcription result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Transcript {
    /// Concatenated text
    #[serde(default)]
    pub text: String,
    /// Detected or requested language
    #[serde(default)]
    pub language: Option<String>,
    /// Sentence-level intervals, time ordered
    pub intervals: Vec<TranscriptInterval>,
    /// Flattened word timings
    #[serde(default)]
    pub words: Vec<WordTimestamp>,
}

/// Transcript validation error.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptError {
    /// Interval has a non-finite or negative bound
    InvalidBound { index: usize, value: f64 },
    /// Start time is not before end time
    StartNotBeforeEnd { index: usize, start: f64, end: f64 },
    /// Interval starts before the previous one ended
    Overlap { index: usize, start: f64, previous_end: f64 },
    /// Video duration is unusable
    InvalidDuration(f64),
}

impl std::fmt::Display for TranscriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBound { index, value } => {
                write!(f, "Interval {} has invalid time value {}", index, value)
            }
            Self::StartNotBeforeEnd { index, start, end } => write!(
                f,
                "Interval {} start ({:.3}s) must be before end ({:.3}s)",
                index, start, end
            ),
            Self::Overlap {
                index,
                start,
                previous_end,
            } => write!(
                f,
                "Interval {} starts at {:.3}s before previous interval ends at {:.3}s",
                index, start, previous_end
            ),
            Self::InvalidDuration(d) => write!(f, "Invalid video duration: {}", d),
        }
    }
}

impl std::error::Error for TranscriptError {}

/// Result of [`Transcript::normalized`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedIntervals {
    pub intervals: Vec<TranscriptInterval>,
    /// Intervals whose end was pulled back to the video duration
    pub clamped: usize,
    /// Intervals that started at or past the video duration
    pub dropped: usize,
}

impl Transcript {
    pub fn from_intervals(intervals: Vec<TranscriptInterval>) -> Self {
        let text = intervals
            .iter()
            .map(|i| i.text.trim())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            text,
            language: None,
            intervals,
            words: Vec::new(),
        }
    }

    /// Check ordering and bounds of every interval.
    pub fn validate(&self) -> Result<(), TranscriptError> {
        let mut previous_end = 0.0_f64;
        for (index, interval) in self.intervals.iter().enumerate() {
            for value in [interval.start, interval.end] {
                if !value.is_finite() || value < 0.0 || value > MAX_VIDEO_DURATION_SECS {
                    return Err(TranscriptError::InvalidBound { index, value });
                }
            }
            if interval.start >= interval.end {
                return Err(TranscriptError::StartNotBeforeEnd {
                    index,
                    start: interval.start,
                    end: interval.end,
                });
            }
            if interval.start < previous_end {
                return Err(TranscriptError::Overlap {
                    index,
                    start: interval.start,
                    previous_end,
                });
            }
            previous_end = interval.end;
        }
        Ok(())
    }

    /// Validate, then fit the intervals inside `[0, video_duration]`.
    pub fn normalized(&self, video_duration: f64) -> Result<NormalizedIntervals, TranscriptError> {
        if !video_duration.is_finite() || video_duration <= 0.0 {
            return Err(TranscriptError::InvalidDuration(video_duration));
        }
        self.validate()?;

        let mut out = NormalizedIntervals {
            intervals: Vec::with_capacity(self.intervals.len()),
            clamped: 0,
            dropped: 0,
        };
        for interval in &self.intervals {
            if interval.start >= video_duration {
                out.dropped += 1;
                continue;
            }
            let mut interval = interval.clone();
            if interval.end > video_duration {
                interval.end = video_duration;
                out.clamped += 1;
            }
            out.intervals.push(interval);
        }
        Ok(out)
    }
}
