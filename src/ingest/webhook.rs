//! Webhook intake: verification handshake and payload processing.
//!
//! Walks the provider's nested `entry[].changes[].value.messages[]` payload,
//! resolves audio messages to text through the transcriber, normalizes the
//! sender phone and queues each resolved message as Pending. Content-level
//! problems never fail the request; they are collected as error strings in
//! the response summary.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::adapters::{OpenAiTranscriber, WhatsAppClient};
use crate::domain::IncomingMessage;
use crate::extract::heuristic;
use crate::store::MessageStore;

/// Synchronous summary returned to the provider for one POST.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WebhookReport {
    /// Every message object seen, regardless of outcome
    pub received: u32,
    /// Messages persisted as Pending
    pub queued: u32,
    /// Messages the heuristic probe could parse (informational only)
    pub valid: u32,
    /// Content-level problems, one string each
    pub errors: Vec<String>,
}

/// Webhook intake service.
pub struct WebhookService {
    verify_token: String,
    locale: String,
    store: Arc<MessageStore>,
    whatsapp: Arc<WhatsAppClient>,
    transcriber: Arc<OpenAiTranscriber>,
}

impl WebhookService {
    pub fn new(
        verify_token: String,
        locale: String,
        store: Arc<MessageStore>,
        whatsapp: Arc<WhatsAppClient>,
        transcriber: Arc<OpenAiTranscriber>,
    ) -> Self {
        Self {
            verify_token,
            locale,
            store,
            whatsapp,
            transcriber,
        }
    }

    /// Verification handshake: true iff mode is "subscribe" and the token
    /// matches the configured secret. Side-effect-free.
    pub fn verify(&self, mode: &str, token: &str) -> bool {
        mode == "subscribe" && token == self.verify_token
    }

    /// Process one webhook payload. Never fails: content-level problems are
    /// reported in the summary, and messages queued before a later problem
    /// stay queued.
    pub async fn process(&self, payload: &Value) -> WebhookReport {
        let mut report = WebhookReport::default();

        let Some(entries) = payload.get("entry").and_then(|e| e.as_array()) else {
            report.errors.push("No entry".to_string());
            return report;
        };

        for entry in entries {
            let Some(changes) = entry.get("changes").and_then(|c| c.as_array()) else {
                continue;
            };
            for change in changes {
                let Some(value) = change.get("value") else {
                    continue;
                };
                let Some(messages) = value.get("messages").and_then(|m| m.as_array()) else {
                    continue;
                };
                for message in messages {
                    report.received += 1;
                    self.process_message(message, &mut report).await;
                }
            }
        }

        report
    }

    /// Handle one message object: resolve a text body, queue it, probe it.
    async fn process_message(&self, message: &Value, report: &mut WebhookReport) {
        let msg_type = message.get("type").and_then(|t| t.as_str()).unwrap_or("");
        let from = message
            .get("from")
            .and_then(|f| f.as_str())
            .unwrap_or("unknown");

        let body = match msg_type {
            "text" => {
                let Some(body) = message
                    .get("text")
                    .and_then(|t| t.get("body"))
                    .and_then(|b| b.as_str())
                else {
                    report.errors.push("Text message without body".to_string());
                    return;
                };
                body.to_string()
            }
            "audio" => match self.resolve_audio_body(message).await {
                Ok(body) => body,
                Err(error) => {
                    report.errors.push(error);
                    return;
                }
            },
            other => {
                report
                    .errors
                    .push(format!("Ignoring unsupported message type: {}", other));
                return;
            }
        };

        let incoming = IncomingMessage::new(normalize_phone(from), body.clone());
        debug!(message_id = %incoming.id, from = %incoming.from, "Queueing incoming message");

        if let Err(e) = self.store.enqueue(&incoming).await {
            warn!(error = %e, "Failed to persist incoming message");
            report.errors.push(format!("Unexpected error: {}", e));
            return;
        }
        report.queued += 1;

        // Ingest-time probe: informs the synchronous response only. The
        // authoritative extraction happens in the retry processor.
        let probe_owner = format!("whatsapp:{}", from);
        if heuristic::try_parse(&body, &probe_owner, &self.locale).is_some() {
            report.valid += 1;
        } else {
            report.errors.push(format!("Could not parse text: {}", body));
        }
    }

    /// Audio chain: media id -> temporary URL -> bytes -> transcript.
    /// Any failure yields an error string and the message is not queued.
    async fn resolve_audio_body(&self, message: &Value) -> Result<String, String> {
        let audio = message.get("audio");
        let media_id = audio
            .and_then(|a| a.get("id"))
            .and_then(|i| i.as_str())
            .ok_or_else(|| "Audio message without media id".to_string())?;
        let mime_type = audio
            .and_then(|a| a.get("mime_type"))
            .and_then(|m| m.as_str())
            .unwrap_or("application/octet-stream");

        let media_url = self
            .whatsapp
            .media_url(media_id)
            .await
            .ok_or_else(|| format!("Failed to get media URL for id={}", media_id))?;

        let bytes = self
            .whatsapp
            .download_media(&media_url)
            .await
            .ok_or_else(|| format!("Failed to download media for id={}", media_id))?;

        let filename = format!("audio-{}{}", media_id, extension_for_mime(mime_type));
        self.transcriber
            .transcribe(bytes, &filename, mime_type)
            .await
            .ok_or_else(|| format!("Failed to transcribe audio for id={}", media_id))
    }
}

/// Canonicalize a phone number to digits.
///
/// Brazilian numbers (country code 55) with 12 digits are missing the mobile
/// "9" prefix; it is inserted right after country (2) + area (2) to produce
/// the canonical 13-digit form. Everything else passes through unchanged.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.starts_with("55") && digits.len() == 12 {
        format!("{}9{}", &digits[..4], &digits[4..])
    } else {
        digits
    }
}

/// File extension for the transcription filename, from the MIME type.
fn extension_for_mime(mime_type: &str) -> &'static str {
    if mime_type.contains("ogg") {
        ".ogg"
    } else if mime_type.contains("mpeg") {
        ".mp3"
    } else if mime_type.contains("aac") {
        ".aac"
    } else if mime_type.contains("wav") {
        ".wav"
    } else if mime_type.contains("amr") {
        ".amr"
    } else {
        ".bin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_inserts_ninth_digit() {
        // 55 + area 11 + 8-digit local = 12 digits
        assert_eq!(normalize_phone("551199990000"), "5511999990000");
    }

    #[test]
    fn test_normalize_keeps_13_digit_numbers() {
        assert_eq!(normalize_phone("5511999990000"), "5511999990000");
    }

    #[test]
    fn test_normalize_strips_formatting() {
        assert_eq!(normalize_phone("+55 (11) 9999-0000"), "5511999990000");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_phone("551199990000");
        assert_eq!(normalize_phone(&once), once);
    }

    #[test]
    fn test_normalize_passes_other_numbers_through() {
        assert_eq!(normalize_phone("14155550123"), "14155550123");
        assert_eq!(normalize_phone("55119999"), "55119999");
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("audio/ogg; codecs=opus"), ".ogg");
        assert_eq!(extension_for_mime("audio/mpeg"), ".mp3");
        assert_eq!(extension_for_mime("audio/aac"), ".aac");
        assert_eq!(extension_for_mime("audio/wav"), ".wav");
        assert_eq!(extension_for_mime("audio/amr"), ".amr");
        assert_eq!(extension_for_mime("application/octet-stream"), ".bin");
    }
}
