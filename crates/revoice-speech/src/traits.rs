//! Collaborator seams used by the worker.

use async_trait::async_trait;
use revoice_models::Transcript;

use crate::error::SpeechResult;

/// Speech-to-text service.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe MP3 bytes using the caller's credential.
    async fn transcribe(&self, audio: Vec<u8>, api_key: &str) -> SpeechResult<Transcript>;
}

/// Text-to-speech service.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` with `voice`, returning MP3 bytes.
    async fn synthesize(&self, text: &str, voice: &str) -> SpeechResult<Vec<u8>>;
}
