//! FFmpeg CLI wrapper for the dubbing pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - FFprobe duration and codec inspection
//! - The [`MediaToolkit`] seam used by the worker, with an FFmpeg-backed implementation
//! - Single-cue SRT generation and cross-device file moves

pub mod command;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod subtitles;
pub mod toolkit;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{move_file, replace_file};
pub use probe::{probe_media, CodecPair, MediaInfo};
pub use subtitles::{format_srt_timestamp, single_cue_srt};
pub use toolkit::{atempo_chain, encoder_for_codec, piece_path, FfmpegToolkit, MediaToolkit, PIECE_PREFIX};
