//! Per-job scratch directory.
//!
//! ```text
//! <work_dir>/<job_id>/
//!   segments/    cut pieces, then gap_<n>.mp4 / voice_<n>.mp4
//!   audio/       extracted source audio, synthesized and aligned speech
//!   subtitles/   one-cue SRT per voice segment
//!   concat.txt   concatenation manifest
//! ```
//!
//! Each job gets its own directory so concurrent jobs never share file names.

use std::path::{Path, PathBuf};

use revoice_models::JobId;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::WorkerResult;

pub const SEGMENTS_DIR: &str = "segments";
pub const AUDIO_DIR: &str = "audio";
pub const SUBTITLES_DIR: &str = "subtitles";
const MANIFEST_FILE: &str = "concat.txt";
const STAGED_OUTPUT: &str = "output.mp4";

#[derive(Debug, Clone)]
pub struct JobWorkspace {
    root: PathBuf,
}

impl JobWorkspace {
    /// Create a fresh workspace, discarding leftovers of an earlier attempt.
    pub async fn create(base: &Path, job_id: &JobId) -> WorkerResult<Self> {
        let root = base.join(job_id.as_str());
        if fs::try_exists(&root).await? {
            debug!(path = %root.display(), "Removing stale job workspace");
            fs::remove_dir_all(&root).await?;
        }
        for dir in [SEGMENTS_DIR, AUDIO_DIR, SUBTITLES_DIR] {
            fs::create_dir_all(root.join(dir)).await?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn segments_dir(&self) -> PathBuf {
        self.root.join(SEGMENTS_DIR)
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join(AUDIO_DIR)
    }

    pub fn subtitles_dir(&self) -> PathBuf {
        self.root.join(SUBTITLES_DIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Concatenation target before it is moved to the output directory.
    pub fn staged_output(&self) -> PathBuf {
        self.root.join(STAGED_OUTPUT)
    }

    /// Delete the workspace. Failures are logged, never returned.
    pub async fn cleanup(&self) {
        if let Err(e) = fs::remove_dir_all(&self.root).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.root.display(), "Failed to remove job workspace: {}", e);
            }
        }
    }
}
