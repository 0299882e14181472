//! WhatsApp Cloud API (Meta Graph) client.
//!
//! Covers the three calls the pipeline needs: sending a text message,
//! resolving a media id to a temporary download URL, and downloading the
//! media bytes. All calls are bearer-authenticated and bounded by the
//! configured HTTP timeout.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::WhatsAppSettings;

use super::Notifier;

/// Graph API client for the business phone number.
pub struct WhatsAppClient {
    settings: WhatsAppSettings,
    client: reqwest::Client,
}

impl WhatsAppClient {
    pub fn new(settings: WhatsAppSettings, timeout: Duration) -> Self {
        Self {
            settings,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.settings.graph_base_url.trim_end_matches('/'),
            path
        )
    }

    /// Resolve a temporary media URL for the given media id. Returns `None`
    /// on any failure or when the URL does not survive sanitization.
    pub async fn media_url(&self, media_id: &str) -> Option<String> {
        let url = self.api_url(media_id);

        let result = async {
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.settings.access_token)
                .send()
                .await
                .context("Failed to fetch media metadata")?;

            let status = response.status();
            if !status.is_success() {
                anyhow::bail!("Media metadata returned status {}", status);
            }

            let body: Value = response
                .json()
                .await
                .context("Failed to parse media metadata")?;

            body.get("url")
                .and_then(|u| u.as_str())
                .map(|s| s.to_string())
                .context("Media metadata has no url field")
        }
        .await;

        match result {
            Ok(raw) => {
                let sanitized = sanitize_media_url(&raw);
                if sanitized.is_none() {
                    warn!(media_id, url = %raw, "Extracted media URL is invalid");
                }
                sanitized
            }
            Err(e) => {
                warn!(media_id, error = %e, "Failed to get media URL");
                None
            }
        }
    }

    /// Download media bytes from a (sanitized) URL. Returns `None` on any
    /// failure or an empty body.
    pub async fn download_media(&self, media_url: &str) -> Option<Vec<u8>> {
        let result = async {
            let response = self
                .client
                .get(media_url)
                .bearer_auth(&self.settings.access_token)
                .send()
                .await
                .context("Failed to download media")?;

            let status = response.status();
            if !status.is_success() {
                anyhow::bail!("Media download returned status {}", status);
            }

            let bytes = response.bytes().await.context("Failed to read media body")?;
            Ok::<_, anyhow::Error>(bytes.to_vec())
        }
        .await;

        match result {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => {
                warn!(url = %media_url, "Media download returned empty body");
                None
            }
            Err(e) => {
                warn!(url = %media_url, error = %e, "Failed to download media");
                None
            }
        }
    }
}

#[async_trait]
impl Notifier for WhatsAppClient {
    /// POST a text message to the send endpoint of the business number.
    async fn send_text(&self, to: &str, body: &str) -> Result<()> {
        let url = self.api_url(&format!("{}/messages", self.settings.phone_number_id));

        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": body },
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.access_token)
            .json(&payload)
            .send()
            .await
            .context("Failed to send WhatsApp message")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Send message returned status {}: {}", status, text);
        }

        Ok(())
    }
}

/// Clean up a provider-supplied media URL.
///
/// Meta's payloads arrive with JSON escapes (`\/`, `&`) and occasionally
/// a collapsed scheme (`https:/host`). Rejects anything that does not end up
/// with an http(s) scheme.
pub fn sanitize_media_url(raw: &str) -> Option<String> {
    let mut s = raw.trim().to_string();
    if s.is_empty() {
        return None;
    }

    s = s.replace("\\/", "/");
    s = s.replace("\\u0026", "&");
    if s.contains('\\') {
        s = s.replace('\\', "");
    }

    // Repair collapsed scheme slashes (https:/lookaside -> https://lookaside)
    if s.starts_with("https:/") && !s.starts_with("https://") {
        let rest = s["https:/".len()..].trim_start_matches('/');
        s = format!("https://{}", rest);
    } else if s.starts_with("http:/") && !s.starts_with("http://") {
        let rest = s["http:/".len()..].trim_start_matches('/');
        s = format!("http://{}", rest);
    }

    // Bare host+path: assume https
    if !s.starts_with("http://") && !s.starts_with("https://") && looks_like_host_path(&s) {
        s = format!("https://{}", s);
    }

    if s.starts_with("http://") || s.starts_with("https://") {
        Some(s)
    } else {
        None
    }
}

fn looks_like_host_path(s: &str) -> bool {
    let Some(slash) = s.find('/') else {
        return false;
    };
    let host = &s[..slash];
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}
