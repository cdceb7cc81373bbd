//! OpenAI-compatible Whisper transcription backend (works with
//! Speaches/faster-whisper-server).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use vlogbook_core::defaults;
use vlogbook_core::{Error, Result, TranscriptionBackend};

/// Transcribes media audio through `/v1/audio/transcriptions`.
pub struct WhisperBackend {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl WhisperBackend {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            client: reqwest::Client::new(),
            timeout_secs: defaults::TRANSCRIBE_TIMEOUT_SECS,
        }
    }

    /// Create from environment variables.
    /// Returns None if `WHISPER_BASE_URL` is not set.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var(defaults::ENV_WHISPER_BASE_URL).ok()?;
        if base_url.is_empty() {
            return None;
        }
        let model = std::env::var(defaults::ENV_WHISPER_MODEL)
            .unwrap_or_else(|_| defaults::DEFAULT_WHISPER_MODEL.to_string());
        Some(Self::new(base_url, model))
    }

    /// Check if the transcription endpoint responds.
    pub async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        Ok(matches!(response, Ok(r) if r.status().is_success()))
    }
}

/// Whisper API response format.
#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Map a detected MIME type to the file extension expected in the multipart
/// upload.
fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        "audio/aac" => "aac",
        "audio/webm" | "video/webm" => "webm",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        _ => "webm",
    }
}

#[async_trait]
impl TranscriptionBackend for WhisperBackend {
    async fn transcribe(&self, media_path: &Path, language: &str) -> Result<Option<String>> {
        let data = tokio::fs::read(media_path).await?;

        // Detect the real container type from magic bytes; the stored
        // extension is not trusted.
        let mime = infer::get(&data)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let ext = extension_for_mime(&mime);

        debug!(
            path = %media_path.display(),
            mime = %mime,
            model = %self.model,
            byte_count = data.len(),
            "Transcribing media"
        );

        let file_part = reqwest::multipart::Part::bytes(data)
            .file_name(format!("media.{}", ext))
            .mime_str(&mime)
            .map_err(|e| Error::Transcription(format!("Failed to create multipart: {}", e)))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "json");

        // Whisper expects the bare ISO 639-1 code, not a full BCP-47 tag.
        if let Some(code) = language.split('-').next().filter(|c| !c.is_empty()) {
            form = form.text("language", code.to_string());
        }

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .multipart(form)
            .timeout(Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| Error::Transcription(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transcription(format!(
                "Whisper returned {}: {}",
                status, body
            )));
        }

        let result: WhisperResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("Failed to parse response: {}", e)))?;

        let text = result.text.trim();
        if text.is_empty() {
            warn!(path = %media_path.display(), "Transcription produced empty text");
            return Ok(None);
        }
        Ok(Some(text.to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
