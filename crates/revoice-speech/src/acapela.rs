//! Speech-synthesis client (Acapela cloud API).
//!
//! Login exchanges account credentials for a token, which is cached per
//! client and refreshed once when the command endpoint answers 401.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::audio::sniff_mp3;
use crate::error::{SpeechError, SpeechResult};
use crate::traits::SpeechSynthesizer;

const SERVICE: &str = "acapela";

/// Voice used when none is configured.
pub const DEFAULT_VOICE: &str = "Ryan22k_NT";

/// Synthesis client configuration.
#[derive(Clone)]
pub struct AcapelaConfig {
    pub login_url: String,
    pub command_url: String,
    pub email: String,
    pub password: String,
    /// Request timeout
    pub timeout: Duration,
}

impl fmt::Debug for AcapelaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcapelaConfig")
            .field("login_url", &self.login_url)
            .field("command_url", &self.command_url)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AcapelaConfig {
    /// Create config from environment variables.
    pub fn from_env() -> SpeechResult<Self> {
        let email = std::env::var("ACAPELA_EMAIL").unwrap_or_default();
        let password = std::env::var("ACAPELA_PASSWORD").unwrap_or_default();
        if email.is_empty() || password.is_empty() {
            return Err(SpeechError::missing_credentials(
                "ACAPELA_EMAIL and ACAPELA_PASSWORD must be set",
            ));
        }

        Ok(Self {
            login_url: std::env::var("ACAPELA_LOGIN_URL")
                .unwrap_or_else(|_| "https://www.acapela-cloud.com/api/login/".to_string()),
            command_url: std::env::var("ACAPELA_COMMAND_URL")
                .unwrap_or_else(|_| "https://www.acapela-cloud.com/api/command/".to_string()),
            email,
            password,
            timeout: Duration::from_secs(
                std::env::var("SPEECH_HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
        })
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: String,
}

#[derive(Serialize)]
struct CommandRequest<'a> {
    text: &'a str,
    voice: &'a str,
    action: &'static str,
}

/// Speech-synthesis service client.
#[derive(Clone)]
pub struct AcapelaClient {
    http: Client,
    config: AcapelaConfig,
    token: Arc<RwLock<Option<String>>>,
}

impl AcapelaClient {
    pub fn new(config: AcapelaConfig) -> SpeechResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("revoice-speech/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            config,
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn from_env() -> SpeechResult<Self> {
        Self::new(AcapelaConfig::from_env()?)
    }

    /// Cached token, logging in when there is none.
    async fn token(&self) -> SpeechResult<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }

        let mut guard = self.token.write().await;
        // Another task may have logged in while we waited
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let token = self.login().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    async fn invalidate_token(&self) {
        *self.token.write().await = None;
    }

    async fn login(&self) -> SpeechResult<String> {
        debug!(url = %self.config.login_url, "Logging in to synthesis service");
        let resp = self
            .http
            .post(&self.config.login_url)
            .json(&LoginRequest {
                email: &self.config.email,
                password: &self.config.password,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SpeechError::from_http_status(SERVICE, status.as_u16(), body));
        }

        let login: LoginResponse = resp.json().await?;
        if login.token.is_empty() {
            return Err(SpeechError::invalid_response("login returned an empty token"));
        }
        Ok(login.token)
    }

    async fn command(&self, token: &str, text: &str, voice: &str) -> SpeechResult<reqwest::Response> {
        let resp = self
            .http
            .post(&self.config.command_url)
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", token))
            .json(&CommandRequest {
                text,
                voice,
                action: "create_file",
            })
            .send()
            .await?;
        Ok(resp)
    }
}

#[async_trait]
impl SpeechSynthesizer for AcapelaClient {
    async fn synthesize(&self, text: &str, voice: &str) -> SpeechResult<Vec<u8>> {
        let token = self.token().await?;
        let mut resp = self.command(&token, text, voice).await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            warn!("Synthesis token rejected, logging in again");
            self.invalidate_token().await;
            let token = self.token().await?;
            resp = self.command(&token, text, voice).await?;
        }

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SpeechError::from_http_status(SERVICE, status.as_u16(), body));
        }

        let audio = resp.bytes().await?.to_vec();
        debug!(bytes = audio.len(), voice, "Synthesized speech");
        sniff_mp3(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MP3: &[u8] = b"ID3\x03\x00\x00\x00\x00\x00\x00frames";

    fn client_for(server: &MockServer) -> AcapelaClient {
        AcapelaClient::new(AcapelaConfig {
            login_url: format!("{}/api/login/", server.uri()),
            command_url: format!("{}/api/command/", server.uri()),
            email: "dub@example.com".to_string(),
            password: "pw".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    async fn mount_login(server: &MockServer, token: &str, times: u64) {
        Mock::given(method("POST"))
            .and(path("/api/login/"))
            .and(body_json(serde_json::json!({"email": "dub@example.com", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": token})))
            .expect(times)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_synthesize_caches_token() {
        let server = MockServer::start().await;
        mount_login(&server, "t1", 1).await;
        Mock::given(method("POST"))
            .and(path("/api/command/"))
            .and(header("authorization", "Token t1"))
            .and(body_json(serde_json::json!({
                "text": "Hello", "voice": "Ryan22k_NT", "action": "create_file"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(MP3))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.synthesize("Hello", DEFAULT_VOICE).await.unwrap(), MP3);
        assert_eq!(client.synthesize("Hello", DEFAULT_VOICE).await.unwrap(), MP3);
    }

    #[tokio::test]
    async fn test_synthesize_refreshes_rejected_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "stale"})))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        mount_login(&server, "fresh", 1).await;
        Mock::given(method("POST"))
            .and(path("/api/command/"))
            .and(header("authorization", "Token stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/command/"))
            .and(header("authorization", "Token fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(MP3))
            .expect(1)
            .mount(&server)
            .await;

        let audio = client_for(&server).synthesize("Hi", "v").await.unwrap();
        assert_eq!(audio, MP3);
    }

    #[tokio::test]
    async fn test_synthesize_rejects_non_audio() {
        let server = MockServer::start().await;
        mount_login(&server, "t1", 1).await;
        Mock::given(method("POST"))
            .and(path("/api/command/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"error\":\"quota\"}"))
            .mount(&server)
            .await;

        let err = client_for(&server).synthesize("Hi", "v").await.unwrap_err();
        assert!(matches!(err, SpeechError::NotAudio(_)));
    }

    #[tokio::test]
    async fn test_empty_token_is_error() {
        let server = MockServer::start().await;
        mount_login(&server, "", 1).await;

        let err = client_for(&server).synthesize("Hi", "v").await.unwrap_err();
        assert!(matches!(err, SpeechError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_command_failure_status() {
        let server = MockServer::start().await;
        mount_login(&server, "t1", 1).await;
        Mock::given(method("POST"))
            .and(path("/api/command/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client_for(&server).synthesize("Hi", "v").await.unwrap_err();
        assert_eq!(err.http_status(), Some(500));
    }

    #[test]
    #[serial]
    fn test_config_requires_credentials() {
        std::env::remove_var("ACAPELA_EMAIL");
        std::env::remove_var("ACAPELA_PASSWORD");
        assert!(matches!(
            AcapelaConfig::from_env(),
            Err(SpeechError::MissingCredentials(_))
        ));

        std::env::set_var("ACAPELA_EMAIL", "a@b.c");
        std::env::set_var("ACAPELA_PASSWORD", "secret");
        let config = AcapelaConfig::from_env().unwrap();
        assert!(!format!("{:?}", config).contains("secret"));

        std::env::remove_var("ACAPELA_EMAIL");
        std::env::remove_var("ACAPELA_PASSWORD");
    }
}
