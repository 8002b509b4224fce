//! Speech client error types.

use thiserror::Error;

/// Result type for speech operations.
pub type SpeechResult<T> = Result<T, SpeechError>;

/// Errors returned by the transcription and synthesis clients.
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{service} returned status {status}: {body}")]
    RequestFailed {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} rejected credentials")]
    Unauthorized { service: &'static str },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Synthesized content is not MP3 audio ({0} bytes)")]
    NotAudio(usize),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SpeechError {
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn missing_credentials(msg: impl Into<String>) -> Self {
        Self::MissingCredentials(msg.into())
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_http_status(service: &'static str, status: u16, body: impl Into<String>) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { service },
            _ => Self::RequestFailed {
                service,
                status,
                body: body.into(),
            },
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } => Some(*status),
            Self::Unauthorized { .. } => Some(401),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether a later attempt could succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::MissingCredentials(_) | Self::Unauthorized { .. })
    }
}
