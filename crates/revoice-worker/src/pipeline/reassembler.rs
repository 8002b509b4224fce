//! Segment Reassembler.
//!
//! Brings every segment to the codecs of the first one, writes an ordered
//! concat manifest and joins the segments with stream copy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use revoice_media::{move_file, replace_file, CodecPair, MediaToolkit};
use tracing::{debug, info, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::workdir::JobWorkspace;

/// Output of [`Reassembler::merge_all`].
#[derive(Debug, Clone)]
pub struct ReassemblyOutcome {
    /// Final video in the output directory
    pub output_path: PathBuf,
    /// Manifest handed to the concat step
    pub manifest_path: PathBuf,
    /// Indices re-encoded to match the reference codecs
    pub reencoded: Vec<usize>,
}

/// `<stem>_<unix_ts>_processed.mp4`
pub fn output_file_name(file_name: &str, timestamp: i64) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "video".to_string());
    format!("{}_{}_processed.mp4", stem, timestamp)
}

/// Concat demuxer listing, one `file '<path>'` line per segment.
pub fn render_manifest(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("file '{}'\n", p.display().to_string().replace('\'', "'\\''")))
        .collect()
}

pub struct Reassembler {
    media: Arc<dyn MediaToolkit>,
    output_dir: PathBuf,
}

impl Reassembler {
    pub fn new(media: Arc<dyn MediaToolkit>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            media,
            output_dir: output_dir.into(),
        }
    }

    /// Concatenate `ordered` into one file named after `file_name`.
    pub async fn merge_all(
        &self,
        file_name: &str,
        ordered: &[PathBuf],
        workspace: &JobWorkspace,
    ) -> WorkerResult<ReassemblyOutcome> {
        if ordered.is_empty() {
            return Err(WorkerError::invalid_input("no segments to reassemble"));
        }

        let mut absolute = Vec::with_capacity(ordered.len());
        for (index, path) in ordered.iter().enumerate() {
            match tokio::fs::canonicalize(path).await {
                Ok(p) => absolute.push(p),
                Err(_) => {
                    return Err(WorkerError::MissingSegment {
                        index,
                        path: path.clone(),
                    })
                }
            }
        }

        let reference = self.media.probe(&absolute[0]).await?.codecs;
        debug!(reference = %reference, "Reference codecs from first segment");

        let mut reencoded = Vec::new();
        for (index, path) in absolute.iter().enumerate().skip(1) {
            let found = self.media.probe(path).await?.codecs;
            if found == reference {
                continue;
            }
            warn!(
                segment_index = index,
                found = %found,
                expected = %reference,
                "Codec mismatch, re-encoding segment"
            );
            self.conform(index, path, &reference).await?;
            reencoded.push(index);
        }

        let manifest_path = workspace.manifest_path();
        tokio::fs::write(&manifest_path, render_manifest(&absolute))
            .await
            .map_err(WorkerError::Manifest)?;

        let staged = workspace.staged_output();
        self.media.concat(&manifest_path, &staged).await?;

        let output_path = self.output_dir.join(output_file_name(
            file_name,
            chrono::Utc::now().timestamp(),
        ));
        move_file(&staged, &output_path).await?;

        info!(
            segments = absolute.len(),
            reencoded = reencoded.len(),
            output = %output_path.display(),
            "Reassembly complete"
        );

        Ok(ReassemblyOutcome {
            output_path,
            manifest_path,
            reencoded,
        })
    }

    /// Re-encode one segment in place and confirm it now matches.
    async fn conform(&self, index: usize, path: &Path, reference: &CodecPair) -> WorkerResult<()> {
        let tmp = path.with_extension("conformed.mp4");
        self.media.reencode(path, reference, &tmp).await?;
        replace_file(&tmp, path).await?;

        let found = self.media.probe(path).await?.codecs;
        if &found != reference {
            return Err(WorkerError::CodecMismatch {
                index,
                expected: reference.clone(),
                found,
            });
        }
        Ok(())
    }
}
