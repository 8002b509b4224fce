//! Transcription client (Whisper-compatible multipart API).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use revoice_models::{Transcript, TranscriptInterval, WordTimestamp};

use crate::error::{SpeechError, SpeechResult};
use crate::traits::Transcriber;

const SERVICE: &str = "whisper";

/// Transcription client configuration.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Endpoint accepting the multipart upload
    pub api_url: String,
    /// Credential used when a job does not carry its own
    pub default_api_key: Option<String>,
    /// Spoken language hint
    pub language: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            api_url: "https://transcribe.whisperapi.com".to_string(),
            default_api_key: None,
            language: "en".to_string(),
            timeout: Duration::from_secs(300),
        }
    }
}

impl WhisperConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: std::env::var("WHISPER_API_URL").unwrap_or(defaults.api_url),
            default_api_key: std::env::var("WHISPER_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            language: std::env::var("TRANSCRIBE_LANGUAGE").unwrap_or(defaults.language),
            timeout: std::env::var("SPEECH_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    whole_word_timestamps: Vec<WordTimestamp>,
}

impl WhisperResponse {
    fn into_transcript(self) -> Transcript {
        let mut words = Vec::new();
        let intervals = self
            .segments
            .into_iter()
            .map(|seg| {
                words.extend(seg.whole_word_timestamps);
                TranscriptInterval::new(seg.start, seg.end, seg.text.trim())
            })
            .collect();
        Transcript {
            text: self.text,
            language: self.language,
            intervals,
            words,
        }
    }
}

/// Transcription service client.
#[derive(Clone)]
pub struct WhisperClient {
    http: Client,
    config: WhisperConfig,
}

impl WhisperClient {
    pub fn new(config: WhisperConfig) -> SpeechResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("revoice-speech/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> SpeechResult<Self> {
        Self::new(WhisperConfig::from_env())
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }

    fn resolve_key<'a>(&'a self, api_key: &'a str) -> SpeechResult<&'a str> {
        if !api_key.trim().is_empty() {
            return Ok(api_key);
        }
        self.config
            .default_api_key
            .as_deref()
            .ok_or_else(|| SpeechError::missing_credentials("transcription API key"))
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, audio: Vec<u8>, api_key: &str) -> SpeechResult<Transcript> {
        let key = self.resolve_key(api_key)?;
        let audio_len = audio.len();

        let file = Part::bytes(audio)
            .file_name("audio.mp3")
            .mime_str("audio/mpeg")?;
        let form = Form::new()
            .part("file", file)
            .text("fileType", "mp3")
            .text("diarization", "false")
            .text("numSpeakers", "2")
            .text("language", self.config.language.clone())
            .text("task", "transcribe");

        debug!(bytes = audio_len, url = %self.config.api_url, "Uploading audio for transcription");

        let resp = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(key)
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SpeechError::from_http_status(SERVICE, status.as_u16(), body));
        }

        let body = resp.bytes().await?;
        let parsed: WhisperResponse = serde_json::from_slice(&body)?;
        let transcript = parsed.into_transcript();

        info!(
            intervals = transcript.intervals.len(),
            words = transcript.words.len(),
            "Transcription received"
        );
        Ok(transcript)
    }
}
