//! Media operations used by the dubbing pipeline.
//!
//! The worker only talks to [`MediaToolkit`]; [`FfmpegToolkit`] is the
//! production implementation. Every operation writes a new file at
//! `output` and never modifies its inputs.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_media, CodecPair, MediaInfo};

/// File name prefix of the pieces written by [`MediaToolkit::cut_at`].
pub const PIECE_PREFIX: &str = "segment_";

/// Sample rate of generated and burned-in audio.
const AUDIO_SAMPLE_RATE: u32 = 44_100;

/// Largest factor a single `atempo` stage accepts on every FFmpeg release.
const ATEMPO_MAX: f64 = 2.0;
const ATEMPO_MIN: f64 = 0.5;

/// Path of the `index`-th piece produced by a cut.
pub fn piece_path(out_dir: &Path, index: usize) -> PathBuf {
    out_dir.join(format!("{}{:03}.mp4", PIECE_PREFIX, index))
}

/// Media-tool collaborator.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Duration and stream codecs.
    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo>;

    /// Extract the audio track as MP3.
    async fn extract_audio(&self, input: &Path, output: &Path) -> MediaResult<()>;

    /// Cut `input` in one pass at `split_points` (seconds, ascending),
    /// writing `split_points.len() + 1` pieces named by [`piece_path`].
    async fn cut_at(&self, input: &Path, split_points: &[f64], out_dir: &Path) -> MediaResult<()>;

    /// Replace the audio of `video` with `duration` seconds of silence.
    async fn add_silent_audio(&self, video: &Path, duration: f64, output: &Path) -> MediaResult<()>;

    /// Pad `audio` with trailing silence to `target_duration` seconds.
    async fn pad_audio(&self, audio: &Path, target_duration: f64, output: &Path) -> MediaResult<()>;

    /// Speed `audio` up by `factor` (> 1.0 shortens).
    async fn stretch_audio(&self, audio: &Path, factor: f64, output: &Path) -> MediaResult<()>;

    /// Copy the video stream of `video` and encode `audio` alongside it.
    async fn mux_audio(&self, video: &Path, audio: &Path, output: &Path) -> MediaResult<()>;

    /// Burn the cues of `subtitles` into the video stream.
    async fn burn_subtitles(&self, video: &Path, subtitles: &Path, output: &Path) -> MediaResult<()>;

    /// Re-encode `input` so its streams use `codecs`.
    async fn reencode(&self, input: &Path, codecs: &CodecPair, output: &Path) -> MediaResult<()>;

    /// Stream-copy concatenate the files listed in a concat-demuxer manifest.
    async fn concat(&self, manifest: &Path, output: &Path) -> MediaResult<()>;
}

/// Map a probed codec name to an FFmpeg encoder.
pub fn encoder_for_codec(codec: &str) -> &str {
    match codec {
        "h264" => "libx264",
        "hevc" | "h265" => "libx265",
        "vp9" => "libvpx-vp9",
        "mp3" => "libmp3lame",
        "opus" => "libopus",
        "vorbis" => "libvorbis",
        other => other,
    }
}

/// Split a tempo factor into `atempo` stages each within FFmpeg's range.
pub fn atempo_chain(factor: f64) -> String {
    let mut stages = Vec::new();
    let mut remaining = factor;
    while remaining > ATEMPO_MAX {
        stages.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    while remaining < ATEMPO_MIN {
        stages.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    stages.push(remaining);
    stages
        .iter()
        .map(|f| format!("atempo={:.6}", f))
        .collect::<Vec<_>>()
        .join(",")
}

/// Escape a path for use as a filter option value.
fn escape_filter_path(path: &Path) -> String {
    let mut out = String::new();
    for c in path.to_string_lossy().chars() {
        if matches!(c, '\\' | '\'' | ':' | ',' | '[' | ']' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// [`MediaToolkit`] backed by the `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone, Default)]
pub struct FfmpegToolkit {
    runner: FfmpegRunner,
}

impl FfmpegToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    async fn run(&self, cmd: FfmpegCommand) -> MediaResult<()> {
        self.runner.run(&cmd).await
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
        probe_media(path).await
    }

    async fn extract_audio(&self, input: &Path, output: &Path) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(input, output)
            .operation("extract_audio")
            .output_arg("-vn")
            .audio_codec("libmp3lame")
            .output_args(["-q:a", "2"]);
        self.run(cmd).await
    }

    async fn cut_at(&self, input: &Path, split_points: &[f64], out_dir: &Path) -> MediaResult<()> {
        tokio::fs::create_dir_all(out_dir).await?;

        if split_points.is_empty() {
            // Nothing to split; the whole file is the only piece
            let cmd = FfmpegCommand::new(input, piece_path(out_dir, 0))
                .operation("cut")
                .video_codec("libx264")
                .audio_codec("copy")
                .map("0");
            return self.run(cmd).await;
        }

        let times = split_points
            .iter()
            .map(|t| format!("{:.3}", t))
            .collect::<Vec<_>>()
            .join(",");
        debug!(pieces = split_points.len() + 1, times = %times, "Cutting video");

        let pattern = out_dir.join(format!("{}%03d.mp4", PIECE_PREFIX));
        let cmd = FfmpegCommand::new(input, pattern)
            .operation("cut")
            .video_codec("libx264")
            .audio_codec("copy")
            .map("0")
            .output_args(["-f", "segment", "-reset_timestamps", "1"])
            .output_arg("-force_key_frames")
            .output_arg(times.clone())
            .output_arg("-segment_times")
            .output_arg(times);
        self.run(cmd).await
    }

    async fn add_silent_audio(&self, video: &Path, duration: f64, output: &Path) -> MediaResult<()> {
        if duration <= 0.0 {
            return Err(MediaError::invalid_media(format!(
                "Silence duration must be positive, got {}",
                duration
            )));
        }
        let cmd = FfmpegCommand::new(video, output)
            .operation("add_silence")
            .add_lavfi(format!("anullsrc=r={}:cl=stereo", AUDIO_SAMPLE_RATE))
            .duration(duration)
            .video_codec("copy")
            .audio_codec("aac")
            .map("0:v")
            .map("1:a");
        self.run(cmd).await
    }

    async fn pad_audio(&self, audio: &Path, target_duration: f64, output: &Path) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(audio, output)
            .operation("pad_audio")
            .audio_filter(format!("apad=whole_dur={:.3}", target_duration))
            .audio_codec("libmp3lame");
        self.run(cmd).await
    }

    async fn stretch_audio(&self, audio: &Path, factor: f64, output: &Path) -> MediaResult<()> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(MediaError::invalid_media(format!(
                "Invalid tempo factor {}",
                factor
            )));
        }
        let cmd = FfmpegCommand::new(audio, output)
            .operation("stretch_audio")
            .audio_filter(atempo_chain(factor))
            .audio_codec("libmp3lame");
        self.run(cmd).await
    }

    async fn mux_audio(&self, video: &Path, audio: &Path, output: &Path) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(video, output)
            .operation("mux_audio")
            .add_input(audio)
            .video_codec("copy")
            .audio_codec("aac")
            .map("0:v")
            .map("1:a");
        self.run(cmd).await
    }

    async fn burn_subtitles(&self, video: &Path, subtitles: &Path, output: &Path) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(video, output)
            .operation("burn_subtitles")
            .video_filter(format!("subtitles={}:si=0", escape_filter_path(subtitles)))
            .video_codec("libx264")
            .audio_codec("aac")
            .output_args(["-ar", "44100", "-ac", "2"]);
        self.run(cmd).await
    }

    async fn reencode(&self, input: &Path, codecs: &CodecPair, output: &Path) -> MediaResult<()> {
        let mut cmd = FfmpegCommand::new(input, output).operation("reencode").map("0");
        if let Some(video) = &codecs.video {
            cmd = cmd.video_codec(encoder_for_codec(video));
        }
        if let Some(audio) = &codecs.audio {
            cmd = cmd.audio_codec(encoder_for_codec(audio));
        }
        self.run(cmd).await
    }

    async fn concat(&self, manifest: &Path, output: &Path) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(manifest, output)
            .operation("concat")
            .input_arg("-f")
            .input_arg("concat")
            .input_arg("-safe")
            .input_arg("0")
            .output_args(["-c", "copy", "-movflags", "+faststart"]);
        self.run(cmd).await
    }
}
