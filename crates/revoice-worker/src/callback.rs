//! Completion webhook.

use std::time::Duration;

use revoice_models::CompletionPayload;
use tracing::{debug, info};

use crate::error::WorkerResult;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts [`CompletionPayload`]s to caller-supplied URLs.
#[derive(Clone)]
pub struct CallbackNotifier {
    http: reqwest::Client,
}

impl CallbackNotifier {
    pub fn new() -> WorkerResult<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> WorkerResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// POST `payload` as JSON. Non-2xx responses are errors.
    pub async fn notify(&self, url: &str, payload: &CompletionPayload) -> WorkerResult<()> {
        debug!(url, "Posting completion callback");
        let response = self.http.post(url).json(payload).send().await?;
        let status = response.status();
        response.error_for_status()?;
        info!(url, status = status.as_u16(), "Callback delivered");
        Ok(())
    }
}
