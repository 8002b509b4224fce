//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use revoice_queue::QueueConfig;
use revoice_speech::DEFAULT_VOICE;

use crate::retry::BackoffPolicy;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Long-lived workers sharing the job queue
    pub num_workers: usize,
    /// Queue capacity and completion delivery timeout
    pub queue: QueueConfig,
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Backoff base, doubled per retry
    pub initial_backoff: Duration,
    /// Backoff ceiling
    pub max_backoff: Duration,
    /// Root for per-job scratch directories
    pub work_dir: PathBuf,
    /// Where finished videos are written
    pub output_dir: PathBuf,
    /// Synthesis voice identifier
    pub voice: String,
    /// Burn a caption cue into each voice segment
    pub burn_subtitles: bool,
    /// Leave per-job directories behind for debugging
    pub keep_work_dir: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            num_workers: 5,
            queue: QueueConfig::default(),
            max_retries: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(16),
            work_dir: PathBuf::from("/tmp/revoice"),
            output_dir: PathBuf::from("./processed"),
            voice: DEFAULT_VOICE.to_string(),
            burn_subtitles: true,
            keep_work_dir: false,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            num_workers: std::env::var("WORKER_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.num_workers),
            queue: QueueConfig::from_env(),
            max_retries: std::env::var("WORKER_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            initial_backoff: Duration::from_millis(
                std::env::var("WORKER_INITIAL_BACKOFF_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            max_backoff: Duration::from_millis(
                std::env::var("WORKER_MAX_BACKOFF_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(16_000),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            output_dir: std::env::var("PROCESSED_VIDEO_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            voice: std::env::var("TTS_VOICE")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.voice),
            burn_subtitles: std::env::var("WORKER_BURN_SUBTITLES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.burn_subtitles),
            keep_work_dir: std::env::var("WORKER_KEEP_WORK_DIR")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.keep_work_dir),
        }
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial: self.initial_backoff,
            max: self.max_backoff,
            max_retries: self.max_retries,
        }
    }
}
