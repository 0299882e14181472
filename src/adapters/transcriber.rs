//! Audio transcription via the OpenAI speech-to-text endpoint.
//!
//! Multipart POST with the model name, an optional language hint derived
//! from the configured locale, and the audio bytes as a file part. With a
//! fake key a fixed stub transcript keeps the flow testable offline.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tracing::warn;

use crate::config::OpenAiSettings;

/// Transcript returned for fake-key (offline) configurations.
const DEV_STUB_TRANSCRIPT: &str = "[transcricao-dev]";

/// Speech-to-text client.
pub struct OpenAiTranscriber {
    settings: OpenAiSettings,
    locale: String,
    client: reqwest::Client,
}

impl OpenAiTranscriber {
    pub fn new(settings: OpenAiSettings, locale: impl Into<String>, timeout: Duration) -> Self {
        Self {
            settings,
            locale: locale.into(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Transcribe audio bytes to text. Returns `None` on any failure; the
    /// caller records an error string and skips the message.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Option<String> {
        if audio.is_empty() {
            return None;
        }
        if self.settings.is_fake_key() {
            return Some(DEV_STUB_TRANSCRIPT.to_string());
        }

        match self.call(audio, filename, mime_type).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => {
                warn!(filename, "Transcription returned empty text");
                None
            }
            Err(e) => {
                warn!(filename, error = %e, "Failed to transcribe audio");
                None
            }
        }
    }

    async fn call(&self, audio: Vec<u8>, filename: &str, mime_type: &str) -> Result<String> {
        let url = format!(
            "{}/audio/transcriptions",
            self.settings.base_url.trim_end_matches('/')
        );

        let file_part = Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .context("Invalid MIME type for audio part")?;

        let mut form = Form::new()
            .text("model", "whisper-1")
            .part("file", file_part);

        // Language hint: first subtag of the locale ("pt-BR" -> "pt")
        let lang = self.locale.split('-').next().unwrap_or_default();
        if !lang.is_empty() {
            form = form.text("language", lang.to_string());
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .multipart(form)
            .send()
            .await
            .context("Failed to call transcription endpoint")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Transcription returned status {}", status);
        }

        let body = response
            .text()
            .await
            .context("Failed to read transcription body")?;

        // Expected shape is {"text": "..."}; some deployments answer with
        // plain text, which we pass through as-is.
        match serde_json::from_str::<Value>(&body) {
            Ok(json) => Ok(json
                .get("text")
                .and_then(|t| t.as_str())
                .map(|t| t.to_string())
                .unwrap_or(body)),
            Err(_) => Ok(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_transcriber() -> OpenAiTranscriber {
        OpenAiTranscriber::new(
            OpenAiSettings {
                api_key: "FAKE_KEY".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
            },
            "pt-BR",
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_fake_key_returns_stub() {
        let t = fake_transcriber();
        let text = t
            .transcribe(b"fake audio".to_vec(), "audio-1.ogg", "audio/ogg")
            .await;
        assert_eq!(text.as_deref(), Some(DEV_STUB_TRANSCRIPT));
    }

    #[tokio::test]
    async fn test_empty_audio_is_none() {
        let t = fake_transcriber();
        assert!(t.transcribe(Vec::new(), "a.ogg", "audio/ogg").await.is_none());
    }
}
