//! Clients for the external speech collaborators.
//!
//! - [`WhisperClient`]: speech-to-text over multipart upload
//! - [`AcapelaClient`]: text-to-speech with a cached login token
//!
//! The worker depends only on the [`Transcriber`] and [`SpeechSynthesizer`]
//! traits so tests can substitute in-memory fakes.

pub mod acapela;
pub mod audio;
pub mod error;
pub mod traits;
pub mod whisper;

pub use acapela::{AcapelaClient, AcapelaConfig, DEFAULT_VOICE};
pub use audio::{is_mp3, sniff_mp3};
pub use error::{SpeechError, SpeechResult};
pub use traits::{SpeechSynthesizer, Transcriber};
pub use whisper::{WhisperClient, WhisperConfig};
