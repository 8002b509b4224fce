//! FFprobe duration and codec inspection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

use crate::command::{check_ffprobe, stderr_tail, MEDIA_TOOL_DURATION_SECONDS};
use crate::error::{MediaError, MediaResult};

/// Codec identifiers of the first video and audio streams.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecPair {
    pub video: Option<String>,
    pub audio: Option<String>,
}

impl CodecPair {
    pub fn new(video: impl Into<String>, audio: impl Into<String>) -> Self {
        Self {
            video: Some(video.into()),
            audio: Some(audio.into()),
        }
    }
}

impl fmt::Display for CodecPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.video.as_deref().unwrap_or("-"),
            self.audio.as_deref().unwrap_or("-")
        )
    }
}

/// Media file information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Stream codecs
    pub codecs: CodecPair,
    /// File size in bytes
    pub size: u64,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    duration: Option<String>,
}

/// Probe a media file (video or audio-only) for duration and codecs.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let started = Instant::now();
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    metrics::histogram!(MEDIA_TOOL_DURATION_SECONDS, "operation" => "probe")
        .record(started.elapsed().as_secs_f64());

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed for {}", path.display()),
            stderr: Some(stderr_tail(&output.stderr)),
        });
    }

    parse_probe_output(&output.stdout)
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_probe_output(stdout: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let video = probe.streams.iter().find(|s| s.codec_type == "video");
    let audio = probe.streams.iter().find(|s| s.codec_type == "audio");

    if video.is_none() && audio.is_none() {
        return Err(MediaError::invalid_media("No audio or video stream found"));
    }

    // Container duration first, then the longest stream
    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            probe
                .streams
                .iter()
                .filter_map(|s| s.duration.as_deref()?.parse::<f64>().ok())
                .reduce(f64::max)
        })
        .ok_or_else(|| MediaError::invalid_media("Duration not reported"))?;

    let size = probe
        .format
        .size
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    Ok(MediaInfo {
        duration,
        codecs: CodecPair {
            video: video.and_then(|s| s.codec_name.clone()),
            audio: audio.and_then(|s| s.codec_name.clone()),
        },
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_video_with_audio() {
        let json = br#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "duration": "10.0"},
                {"codec_type": "audio", "codec_name": "aac", "duration": "9.98"}
            ],
            "format": {"duration": "10.010000", "size": "123456"}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert!((info.duration - 10.01).abs() < 1e-9);
        assert_eq!(info.codecs, CodecPair::new("h264", "aac"));
        assert_eq!(info.size, 123456);
    }

    #[test]
    fn test_parse_audio_only_falls_back_to_stream_duration() {
        let json = br#"{
            "streams": [{"codec_type": "audio", "codec_name": "mp3", "duration": "2.5"}],
            "format": {}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.duration, 2.5);
        assert_eq!(info.codecs.video, None);
        assert_eq!(info.codecs.audio.as_deref(), Some("mp3"));
    }

    #[test]
    fn test_parse_rejects_streamless_output() {
        let json = br#"{"streams": [], "format": {"duration": "1.0"}}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(MediaError::InvalidMedia(_))
        ));
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let result = probe_media("/definitely/not/here.mp4").await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
