//! Job definitions for queue processing.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a job.
///
/// ```text
/// Queued ──► Processing ──► Completed
///    ▲            │
///    │            ├──────► Failed
///    │            ▼
///    └──────── Retrying
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the shared queue
    #[default]
    Queued,
    /// Owned by exactly one worker
    Processing,
    /// Attempt failed, sleeping before re-enqueue
    Retrying,
    /// Output delivered
    Completed,
    /// Retries exhausted or non-retryable error
    Failed,
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid job transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Retrying => "retrying",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `next` is reachable from `self` in one step.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Retrying)
                | (Retrying, Queued)
        )
    }

    /// Move to `next`, rejecting edges the state machine does not have.
    pub fn transition(self, next: JobStatus) -> Result<JobStatus, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition { from: self, to: next })
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request to re-voice one uploaded video.
#[derive(Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobSubmission {
    /// Path of the unprocessed upload
    pub source_path: PathBuf,
    /// Original upload name, used to name the output
    pub file_name: String,
    /// Credential for the transcription service
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Where to POST the completion payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    /// When the submission was accepted
    #[serde(default = "Utc::now")]
    pub submitted_at: DateTime<Utc>,
}

impl JobSubmission {
    /// Create a submission; the file name is derived from the path.
    pub fn new(source_path: impl Into<PathBuf>, api_key: impl Into<String>) -> Self {
        let source_path = source_path.into();
        let file_name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            source_path,
            file_name,
            api_key: api_key.into(),
            callback_url: None,
            submitted_at: Utc::now(),
        }
    }

    /// Set the callback URL.
    pub fn with_callback(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    /// Base name of the upload without its extension.
    pub fn stem(&self) -> String {
        Path::new(&self.file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string())
    }

    /// Validate the submission.
    pub fn validate(&self) -> Result<(), String> {
        if self.source_path.as_os_str().is_empty() {
            return Err("Source path must be specified".to_string());
        }

        if self.file_name.is_empty() {
            return Err("File name must be specified".to_string());
        }

        if self.api_key.trim().is_empty() {
            return Err("API key is required".to_string());
        }

        if let Some(callback) = &self.callback_url {
            let parsed = url::Url::parse(callback)
                .map_err(|e| format!("Invalid callback URL '{}': {}", callback, e))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(format!("Callback URL must be http(s): {}", callback));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for JobSubmission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSubmission")
            .field("source_path", &self.source_path)
            .field("file_name", &self.file_name)
            .field("api_key", &"<redacted>")
            .field("callback_url", &self.callback_url)
            .field("submitted_at", &self.submitted_at)
            .finish()
    }
}

/// Body of the completion webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CompletionPayload {
    pub status: String,
    pub processed_video_path: String,
}

impl CompletionPayload {
    pub fn done(path: impl AsRef<Path>) -> Self {
        Self {
            status: "done".to_string(),
            processed_video_path: path.as_ref().to_string_lossy().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_unique() {
        assert_ne!(JobId::new(), JobId::new());
        assert_eq!(JobId::from_string("abc").as_str(), "abc");
    }

    #[test]
    fn test_status_transitions() {
        let s = JobStatus::Queued;
        let s = s.transition(JobStatus::Processing).unwrap();
        let s = s.transition(JobStatus::Retrying).unwrap();
        let s = s.transition(JobStatus::Queued).unwrap();
        let s = s.transition(JobStatus::Processing).unwrap();
        let s = s.transition(JobStatus::Completed).unwrap();
        assert!(s.is_terminal());

        assert!(JobStatus::Completed.transition(JobStatus::Queued).is_err());
        assert!(JobStatus::Failed.transition(JobStatus::Processing).is_err());
        assert!(JobStatus::Queued.transition(JobStatus::Completed).is_err());
        assert!(JobStatus::Processing.transition(JobStatus::Queued).is_err());
    }

    #[test]
    fn test_submission_derives_file_name() {
        let sub = JobSubmission::new("/uploads/talk.final.mp4", "key");
        assert_eq!(sub.file_name, "talk.final.mp4");
        assert_eq!(sub.stem(), "talk.final");
        assert!(sub.validate().is_ok());
    }

    #[test]
    fn test_submission_validation() {
        assert!(JobSubmission::new("/a.mp4", " ").validate().is_err());
        assert!(JobSubmission::new("/a.mp4", "k")
            .with_callback("not a url")
            .validate()
            .is_err());
        assert!(JobSubmission::new("/a.mp4", "k")
            .with_callback("ftp://host/cb")
            .validate()
            .is_err());
        assert!(JobSubmission::new("/a.mp4", "k")
            .with_callback("https://caller.example/cb")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_submission_debug_redacts_key() {
        let sub = JobSubmission::new("/a.mp4", "super-secret");
        let dbg = format!("{:?}", sub);
        assert!(!dbg.contains("super-secret"));
    }

    #[test]
    fn test_completion_payload_shape() {
        let payload = CompletionPayload::done("/out/a_1_processed.mp4");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "done");
        assert_eq!(json["processed_video_path"], "/out/a_1_processed.mp4");

        let schema = schemars::schema_for!(CompletionPayload);
        let schema_json = serde_json::to_string(&schema).unwrap();
        assert!(schema_json.contains("processed_video_path"));
    }
}
