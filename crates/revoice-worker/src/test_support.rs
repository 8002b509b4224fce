//! In-memory collaborators for pipeline tests.
//!
//! Fake media files are small JSON documents carrying their duration and
//! codecs, so renames and copies keep metadata attached to content.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use revoice_media::{piece_path, CodecPair, MediaError, MediaInfo, MediaResult, MediaToolkit};
use revoice_models::{Transcript, TranscriptInterval};
use revoice_speech::{SpeechError, SpeechResult, SpeechSynthesizer, Transcriber};

pub(crate) const FAKE_SPEECH: &[u8] = b"ID3fake-speech";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FakeMeta {
    pub duration: f64,
    pub video: Option<String>,
    pub audio: Option<String>,
}

impl FakeMeta {
    pub fn video(duration: f64) -> Self {
        Self {
            duration,
            video: Some("h264".to_string()),
            audio: Some("aac".to_string()),
        }
    }
}

pub(crate) async fn write_meta(path: &Path, meta: &FakeMeta) {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.unwrap();
    }
    tokio::fs::write(path, serde_json::to_vec(meta).unwrap())
        .await
        .unwrap();
}

pub(crate) async fn read_meta(path: &Path) -> Option<FakeMeta> {
    let bytes = tokio::fs::read(path).await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Media toolkit that writes metadata files instead of running FFmpeg.
pub(crate) struct FakeMedia {
    /// Duration reported for non-JSON audio (synthesized speech)
    pub speech_duration: Mutex<f64>,
    /// Added to the number of pieces a cut produces
    pub piece_delta: Mutex<isize>,
    pub failing: Mutex<HashSet<&'static str>>,
    pub calls: Mutex<Vec<(&'static str, PathBuf)>>,
}

impl Default for FakeMedia {
    fn default() -> Self {
        Self {
            speech_duration: Mutex::new(1.0),
            piece_delta: Mutex::new(0),
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeMedia {
    pub fn with_speech_duration(self, secs: f64) -> Self {
        *self.speech_duration.lock().unwrap() = secs;
        self
    }

    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn calls_of(&self, op: &str) -> Vec<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| *name == op)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn record(&self, op: &'static str, path: &Path) -> MediaResult<()> {
        self.calls.lock().unwrap().push((op, path.to_path_buf()));
        if self.failing.lock().unwrap().contains(op) {
            return Err(MediaError::ffmpeg_failed(op, "injected failure", None, Some(1)));
        }
        Ok(())
    }

    async fn meta(&self, path: &Path) -> MediaResult<FakeMeta> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        Ok(read_meta(path).await.unwrap_or_else(|| FakeMeta {
            duration: *self.speech_duration.lock().unwrap(),
            video: None,
            audio: Some("mp3".to_string()),
        }))
    }
}

#[async_trait]
impl MediaToolkit for FakeMedia {
    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
        let meta = self.meta(path).await?;
        Ok(MediaInfo {
            duration: meta.duration,
            codecs: CodecPair {
                video: meta.video,
                audio: meta.audio,
            },
            size: 0,
        })
    }

    async fn extract_audio(&self, input: &Path, output: &Path) -> MediaResult<()> {
        self.record("extract_audio", input)?;
        self.meta(input).await?;
        tokio::fs::write(output, b"ID3source-audio").await?;
        Ok(())
    }

    async fn cut_at(&self, input: &Path, split_points: &[f64], out_dir: &Path) -> MediaResult<()> {
        self.record("cut", input)?;
        let source = self.meta(input).await?;
        let mut bounds = vec![0.0];
        bounds.extend_from_slice(split_points);
        bounds.push(source.duration);

        let pieces = (split_points.len() as isize + 1 + *self.piece_delta.lock().unwrap()).max(0);
        for i in 0..pieces as usize {
            let duration = match (bounds.get(i), bounds.get(i + 1)) {
                (Some(s), Some(e)) => e - s,
                _ => 1.0,
            };
            let meta = FakeMeta {
                duration,
                ..source.clone()
            };
            write_meta(&piece_path(out_dir, i), &meta).await;
        }
        Ok(())
    }

    async fn add_silent_audio(&self, video: &Path, duration: f64, output: &Path) -> MediaResult<()> {
        self.record("add_silence", video)?;
        let meta = self.meta(video).await?;
        write_meta(output, &FakeMeta { duration, ..meta }).await;
        Ok(())
    }

    async fn pad_audio(&self, audio: &Path, target_duration: f64, output: &Path) -> MediaResult<()> {
        self.record("pad_audio", audio)?;
        let meta = self.meta(audio).await?;
        write_meta(
            output,
            &FakeMeta {
                duration: target_duration,
                ..meta
            },
        )
        .await;
        Ok(())
    }

    async fn stretch_audio(&self, audio: &Path, factor: f64, output: &Path) -> MediaResult<()> {
        self.record("stretch_audio", audio)?;
        let meta = self.meta(audio).await?;
        write_meta(
            output,
            &FakeMeta {
                duration: meta.duration / factor,
                ..meta
            },
        )
        .await;
        Ok(())
    }

    async fn mux_audio(&self, video: &Path, audio: &Path, output: &Path) -> MediaResult<()> {
        self.record("mux_audio", video)?;
        self.meta(audio).await?;
        let meta = self.meta(video).await?;
        write_meta(output, &meta).await;
        Ok(())
    }

    async fn burn_subtitles(&self, video: &Path, subtitles: &Path, output: &Path) -> MediaResult<()> {
        self.record("burn_subtitles", video)?;
        self.meta(subtitles).await?;
        let meta = self.meta(video).await?;
        write_meta(output, &meta).await;
        Ok(())
    }

    async fn reencode(&self, input: &Path, codecs: &CodecPair, output: &Path) -> MediaResult<()> {
        self.record("reencode", input)?;
        let meta = self.meta(input).await?;
        write_meta(
            output,
            &FakeMeta {
                duration: meta.duration,
                video: codecs.video.clone(),
                audio: codecs.audio.clone(),
            },
        )
        .await;
        Ok(())
    }

    async fn concat(&self, manifest: &Path, output: &Path) -> MediaResult<()> {
        self.record("concat", manifest)?;
        let listing = tokio::fs::read(manifest).await?;
        tokio::fs::write(output, listing).await?;
        Ok(())
    }
}

/// Transcriber returning fixed intervals.
pub(crate) struct FakeTranscriber {
    pub intervals: Vec<TranscriptInterval>,
    pub calls: AtomicUsize,
}

impl FakeTranscriber {
    pub fn new(spans: &[(f64, f64, &str)]) -> Self {
        Self {
            intervals: spans
                .iter()
                .map(|(s, e, t)| TranscriptInterval::new(*s, *e, *t))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, audio: Vec<u8>, api_key: &str) -> SpeechResult<Transcript> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!audio.is_empty());
        if api_key.is_empty() {
            return Err(SpeechError::missing_credentials("api key"));
        }
        Ok(Transcript::from_intervals(self.intervals.clone()))
    }
}

/// Synthesizer with scripted failures.
#[derive(Default)]
pub(crate) struct FakeSynthesizer {
    /// Texts that always fail
    pub failing_texts: HashSet<String>,
    /// Calls that fail before any succeeds
    pub transient_failures: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FakeSynthesizer {
    pub fn failing_on(text: &str) -> Self {
        Self {
            failing_texts: HashSet::from([text.to_string()]),
            ..Default::default()
        }
    }

    pub fn flaky(failures: usize) -> Self {
        Self {
            transient_failures: AtomicUsize::new(failures),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, text: &str, _voice: &str) -> SpeechResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_texts.contains(text) {
            return Err(SpeechError::from_http_status("acapela", 500, "synthesis down"));
        }
        let flaked = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if flaked {
            return Err(SpeechError::from_http_status("acapela", 503, "busy"));
        }
        Ok(FAKE_SPEECH.to_vec())
    }
}

/// Config rooted in `dir` with millisecond backoff.
pub(crate) fn test_config(dir: &Path) -> crate::config::WorkerConfig {
    crate::config::WorkerConfig {
        num_workers: 2,
        max_retries: 2,
        initial_backoff: std::time::Duration::from_millis(1),
        max_backoff: std::time::Duration::from_millis(4),
        work_dir: dir.join("work"),
        output_dir: dir.join("out"),
        ..Default::default()
    }
}
