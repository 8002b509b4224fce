//! Per-job pipeline: transcribe, segment, re-voice, reassemble.
//!
//! One call to [`JobPipeline::run`] is one attempt. The executor owns the
//! retry decision; the pipeline only reports a classified error.

use std::path::PathBuf;
use std::sync::Arc;

use revoice_media::MediaToolkit;
use revoice_models::{JobId, JobSubmission};
use revoice_speech::{SpeechSynthesizer, Transcriber};
use tracing::Instrument;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::pipeline::{align_intervals, Reassembler, SegmentProcessor, Segmenter};
use crate::workdir::JobWorkspace;

const SOURCE_AUDIO: &str = "source.mp3";

pub struct JobPipeline {
    config: WorkerConfig,
    media: Arc<dyn MediaToolkit>,
    transcriber: Arc<dyn Transcriber>,
    segmenter: Segmenter,
    processor: SegmentProcessor,
    reassembler: Reassembler,
}

impl JobPipeline {
    pub fn new(
        config: WorkerConfig,
        media: Arc<dyn MediaToolkit>,
        transcriber: Arc<dyn Transcriber>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        let segmenter = Segmenter::new(media.clone());
        let processor = SegmentProcessor::new(
            media.clone(),
            synthesizer,
            config.voice.clone(),
            config.burn_subtitles,
        );
        let reassembler = Reassembler::new(media.clone(), config.output_dir.clone());
        Self {
            config,
            media,
            transcriber,
            segmenter,
            processor,
            reassembler,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run one attempt of `submission` and return the final video path.
    pub async fn run(
        &self,
        job_id: &JobId,
        submission: &JobSubmission,
        attempt: u32,
    ) -> WorkerResult<PathBuf> {
        let logger = JobLogger::new(job_id, "revoice").with_attempt(attempt);
        let span = logger.create_span();

        async {
            logger.log_start(&submission.file_name);

            submission.validate().map_err(WorkerError::invalid_input)?;
            if !tokio::fs::try_exists(&submission.source_path).await? {
                return Err(WorkerError::invalid_input(format!(
                    "source video not found: {}",
                    submission.source_path.display()
                )));
            }

            let workspace = JobWorkspace::create(&self.config.work_dir, job_id).await?;
            let result = self.run_stages(submission, &workspace, &logger).await;
            if !self.config.keep_work_dir {
                workspace.cleanup().await;
            }

            if let Ok(path) = &result {
                logger.log_completion(&path.display().to_string());
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        submission: &JobSubmission,
        workspace: &JobWorkspace,
        logger: &JobLogger,
    ) -> WorkerResult<PathBuf> {
        let source = &submission.source_path;
        let duration = self.media.probe(source).await?.duration;

        let audio_path = workspace.audio_dir().join(SOURCE_AUDIO);
        self.media.extract_audio(source, &audio_path).await?;
        let audio = tokio::fs::read(&audio_path).await?;
        let transcript = self
            .transcriber
            .transcribe(audio, &submission.api_key)
            .await?;

        let normalized = transcript.normalized(duration)?;
        if normalized.clamped > 0 || normalized.dropped > 0 {
            logger.log_warning(&format!(
                "transcript exceeds video duration {:.3}s: {} clamped, {} dropped",
                duration, normalized.clamped, normalized.dropped
            ));
        }
        let intervals = align_intervals(&normalized.intervals, duration);
        if intervals.len() < normalized.intervals.len() {
            logger.log_warning(&format!(
                "{} interval(s) shorter than a millisecond dropped",
                normalized.intervals.len() - intervals.len()
            ));
        }
        logger.log_progress(&format!(
            "transcribed {} intervals over {:.3}s",
            intervals.len(),
            duration
        ));

        let segmentation = self
            .segmenter
            .segment(source, &intervals, duration, workspace)
            .await?;

        let merged = self
            .processor
            .process_voice_segments(&segmentation.voice, &segmentation.all, &intervals, workspace)
            .await?;
        logger.log_progress(&format!("{} segments ready for reassembly", merged.len()));

        let outcome = self
            .reassembler
            .merge_all(&submission.file_name, &merged.into_paths(), workspace)
            .await?;
        if !outcome.reencoded.is_empty() {
            logger.log_warning(&format!(
                "re-encoded segments {:?} to match reference codecs",
                outcome.reencoded
            ));
        }

        Ok(outcome.output_path)
    }
}
