use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WhisperError {
    #[error("HTTP request failed: {0}")]
    Request(String),
    #[error("Whisper transcription failed ({status}): {body}")]
    Upstream {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Failed to read staged audio: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse transcription response: {0}")]
    Decode(String),
}

/// Speech-to-text collaborator. Implemented over HTTP in production and by
/// mocks in tests.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, WhisperError>;
}

/// Client for an OpenAI-compatible transcription server
/// (`POST /v1/audio/transcriptions`).
pub struct WhisperClient {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl WhisperClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        WhisperClient {
            client: Client::new(),
            base_url: base_url.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, WhisperError> {
        let url = format!("{}/v1/audio/transcriptions", self.base_url);

        let bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name))
            .text("model", self.model.clone())
            .text("response_format", "json");

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| WhisperError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WhisperError::Upstream { status, body });
        }

        let payload: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| WhisperError::Decode(e.to_string()))?;

        Ok(payload.text)
    }
}
