//! Speech-to-text for Telegram voice notes.
//!
//! The [`Transcriber`] trait is the seam used by intake; [`WhisperTranscriber`]
//! posts the audio to OpenAI's `/v1/audio/transcriptions` endpoint with a
//! fixed language hint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use crate::credentials::ApiKey;
use crate::providers::openai::OPENAI_API_BASE;
use crate::providers::{check_http_response, http_client, ProviderError};

/// Audio payload downloaded from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    /// Raw bytes (Telegram voice notes are OGG/Opus).
    pub bytes: Vec<u8>,
    /// File name reported to the service; its extension selects the decoder.
    pub file_name: String,
    /// MIME type of `bytes`.
    pub mime_type: String,
}

/// Speech-to-text capability.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a clip into plain text.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the service is unreachable, times out or
    /// rejects the upload.
    async fn transcribe(&self, clip: AudioClip) -> Result<String, ProviderError>;
}

/// OpenAI Whisper transcription client.
#[derive(Debug, Clone)]
pub struct WhisperTranscriber {
    model: String,
    language: String,
    api_key: ApiKey,
    /// API base URL, overridable for tests.
    #[doc(hidden)]
    pub base_url: String,
    client: reqwest::Client,
}

impl WhisperTranscriber {
    /// Create a client for `model` (e.g. `whisper-1`) with a language hint.
    pub fn new(model: String, language: String, api_key: ApiKey, timeout: Duration) -> Self {
        Self {
            model,
            language,
            api_key,
            base_url: OPENAI_API_BASE.to_owned(),
            client: http_client(timeout),
        }
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, clip: AudioClip) -> Result<String, ProviderError> {
        let file = Part::bytes(clip.bytes)
            .file_name(clip.file_name)
            .mime_str(&clip.mime_type)?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("language", self.language.clone())
            .text("response_format", "text");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header(
                "authorization",
                format!("Bearer {}", self.api_key.expose()),
            )
            .multipart(form)
            .send()
            .await?;

        let text = check_http_response(response).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ProviderError::Parse("empty transcription".to_owned()));
        }
        Ok(text.to_owned())
    }
}
