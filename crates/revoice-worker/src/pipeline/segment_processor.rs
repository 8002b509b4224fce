//! Segment Processor: per-voice-segment fan-out with a join barrier.
//!
//! Every voice segment gets its own task that synthesizes speech, fits it
//! to the segment's duration, muxes it over the original video and
//! optionally burns in a caption. Results are written back into a
//! pre-sized [`MergedSegments`] by index once every task has finished.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use revoice_media::{replace_file, single_cue_srt, MediaToolkit};
use revoice_models::{MergedSegments, SegmentJob, TranscriptInterval, VideoSegment};
use revoice_speech::SpeechSynthesizer;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::workdir::{JobWorkspace, AUDIO_DIR, SUBTITLES_DIR};

/// Speech within this many seconds of the segment length is used as-is.
pub const ALIGN_TOLERANCE_SECS: f64 = 0.05;

/// How synthesized speech is fitted to a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Alignment {
    /// Append silence up to the segment duration
    Pad { target: f64 },
    /// Speed the audio up by `factor` (> 1.0)
    Stretch { factor: f64 },
    AsIs,
}

/// Choose the alignment for speech of `audio` seconds over `video` seconds.
pub fn choose_alignment(audio: f64, video: f64) -> Alignment {
    if audio + ALIGN_TOLERANCE_SECS < video {
        Alignment::Pad { target: video }
    } else if audio > video + ALIGN_TOLERANCE_SECS && video > 0.0 {
        Alignment::Stretch {
            factor: audio / video,
        }
    } else {
        Alignment::AsIs
    }
}

#[derive(Clone)]
pub struct SegmentProcessor {
    media: Arc<dyn MediaToolkit>,
    synth: Arc<dyn SpeechSynthesizer>,
    voice: String,
    burn_subtitles: bool,
}

impl SegmentProcessor {
    pub fn new(
        media: Arc<dyn MediaToolkit>,
        synth: Arc<dyn SpeechSynthesizer>,
        voice: impl Into<String>,
        burn_subtitles: bool,
    ) -> Self {
        Self {
            media,
            synth,
            voice: voice.into(),
            burn_subtitles,
        }
    }

    /// Re-voice every voice segment concurrently.
    ///
    /// `intervals[i]` holds the text for `voice[i]`. Returns only after all
    /// spawned tasks have finished; any failure fails the whole call.
    pub async fn process_voice_segments(
        &self,
        voice: &[VideoSegment],
        all: &[VideoSegment],
        intervals: &[TranscriptInterval],
        workspace: &JobWorkspace,
    ) -> WorkerResult<MergedSegments> {
        if voice.len() != intervals.len() {
            return Err(WorkerError::SegmentCountMismatch {
                expected: intervals.len(),
                produced: voice.len(),
            });
        }
        for segment in voice {
            match all.get(segment.index) {
                Some(slot) if slot.is_voice() => {}
                _ => {
                    return Err(WorkerError::IndexOutOfRange {
                        index: segment.index,
                        len: all.len(),
                    })
                }
            }
        }

        let mut merged = MergedSegments::from_segments(all);
        let mut tasks = JoinSet::new();

        for (segment, interval) in voice.iter().zip(intervals) {
            let job = SegmentJob {
                text: interval.text.trim().to_string(),
                video_path: segment.path.clone(),
                voice: self.voice.clone(),
                index: segment.index,
                work_dir: workspace.root().to_path_buf(),
            };
            let this = self.clone();
            tasks.spawn(async move {
                let index = job.index;
                let result = this.process_one(job).await;
                (index, result)
            });
        }

        debug!(units = tasks.len(), "Spawned segment tasks");

        let mut first_error: Option<WorkerError> = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok((index, Ok(path))) => merged.write(index, path).map_err(WorkerError::from),
                Ok((index, Err(e))) => {
                    warn!(segment_index = index, "Segment failed: {}", e);
                    Err(WorkerError::segment_failed(index, e))
                }
                Err(e) => Err(WorkerError::TaskFailed(e.to_string())),
            };
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        info!(
            voice = merged.written_count(),
            total = merged.len(),
            "All voice segments processed"
        );
        Ok(merged)
    }

    /// Re-voice one segment, keeping scratch files under `job.work_dir`.
    async fn process_one(&self, job: SegmentJob) -> WorkerResult<PathBuf> {
        let audio_dir = job.work_dir.join(AUDIO_DIR);
        let tts_path = audio_dir.join(format!("tts_{}.mp3", job.index));

        let speech = self.synth.synthesize(&job.text, &job.voice).await?;
        tokio::fs::write(&tts_path, &speech).await?;

        let video_duration = self.media.probe(&job.video_path).await?.duration;
        let audio_duration = self.media.probe(&tts_path).await?.duration;

        let aligned = audio_dir.join(format!("aligned_{}.mp3", job.index));
        let audio = match choose_alignment(audio_duration, video_duration) {
            Alignment::Pad { target } => {
                self.media.pad_audio(&tts_path, target, &aligned).await?;
                aligned
            }
            Alignment::Stretch { factor } => {
                self.media.stretch_audio(&tts_path, factor, &aligned).await?;
                aligned
            }
            Alignment::AsIs => tts_path,
        };
        debug!(
            segment_index = job.index,
            audio_duration,
            video_duration,
            "Speech aligned"
        );

        let muxed = job.video_path.with_extension("muxed.mp4");
        self.media.mux_audio(&job.video_path, &audio, &muxed).await?;
        replace_file(&muxed, &job.video_path).await?;

        if self.burn_subtitles {
            self.burn_caption(&job, video_duration).await?;
        }

        Ok(job.video_path)
    }

    async fn burn_caption(&self, job: &SegmentJob, duration: f64) -> WorkerResult<()> {
        let srt = subtitle_path(&job.work_dir, job.index);
        tokio::fs::write(&srt, single_cue_srt(&job.text, duration)).await?;

        let subbed = job.video_path.with_extension("subbed.mp4");
        self.media
            .burn_subtitles(&job.video_path, &srt, &subbed)
            .await?;
        replace_file(&subbed, &job.video_path).await?;
        Ok(())
    }
}

fn subtitle_path(work_dir: &Path, index: usize) -> PathBuf {
    work_dir
        .join(SUBTITLES_DIR)
        .join(format!("segment_{}.srt", index))
}
