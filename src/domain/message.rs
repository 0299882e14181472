//! Durable record of one inbound chat message.
//!
//! Created by the webhook ingestor with status `Pending`, mutated only by the
//! retry processor, never deleted here. `Processed` and `Error` are terminal:
//! the processor does not re-queue errored messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing status of an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    /// Waiting for the processor to pick it up.
    Pending,

    /// An expense was committed for this message (terminal).
    Processed,

    /// Processing failed; see `error_message` (terminal).
    Error,
}

impl MessageStatus {
    /// Whether the status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Error)
    }
}

/// One inbound chat message awaiting or having undergone expense extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Assigned on creation.
    pub id: Uuid,

    /// Canonicalized sender phone (digits only).
    pub from: String,

    /// Message text; for audio, the transcription result.
    pub body: String,

    /// When the webhook received it.
    pub received_at: DateTime<Utc>,

    /// Current status.
    pub status: MessageStatus,

    /// How many processing attempts were made. Monotonically non-decreasing.
    pub attempts: u32,

    /// When the last attempt started.
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// Failure reason. Set iff status is `Error`.
    pub error_message: Option<String>,
}

impl IncomingMessage {
    /// Create a fresh pending message.
    pub fn new(from: String, body: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            from,
            body,
            received_at: Utc::now(),
            status: MessageStatus::Pending,
            attempts: 0,
            last_attempt_at: None,
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_is_pending() {
        let msg = IncomingMessage::new("5511999990000".to_string(), "oi".to_string());
        assert_eq!(msg.status, MessageStatus::Pending);
        assert_eq!(msg.attempts, 0);
        assert!(msg.last_attempt_at.is_none());
        assert!(msg.error_message.is_none());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!MessageStatus::Pending.is_terminal());
        assert!(MessageStatus::Processed.is_terminal());
        assert!(MessageStatus::Error.is_terminal());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&MessageStatus::Pending).unwrap(),
            "\"PENDING\""
        );
        assert_eq!(
            serde_json::to_string(&MessageStatus::Processed).unwrap(),
            "\"PROCESSED\""
        );
    }
}
