//! JSONL-based durable store for incoming messages.
//!
//! Append-only JSONL with state derived from replay. The webhook appends a
//! `Received` event; the processor appends `AttemptStarted`, `Processed` and
//! `Errored` events. Replaying the log in order rebuilds every message's
//! current state, so a crash mid-batch loses at most the in-flight append.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::{IncomingMessage, MessageStatus};

/// Errors that can occur with the message store
#[derive(Debug, Error)]
pub enum MessageStoreError {
    #[error("Message not found: {0}")]
    NotFound(Uuid),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Message {id} is already terminal ({status:?})")]
    AlreadyTerminal { id: Uuid, status: MessageStatus },
}

/// An event in the message log (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    /// When this event occurred
    pub timestamp: DateTime<Utc>,

    /// The message this event belongs to
    pub message_id: Uuid,

    /// Type of event
    pub event_type: MessageEventType,

    /// Additional data (depends on event type)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Types of message events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageEventType {
    /// Message received by the webhook, queued as pending
    Received,

    /// A processing attempt started
    AttemptStarted,

    /// An expense was committed for this message
    Processed,

    /// Processing failed
    Errored,
}

/// Counts by status, for the status command and logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub pending: usize,
    pub processed: usize,
    pub errored: usize,
}

impl StoreCounts {
    pub fn total(&self) -> usize {
        self.pending + self.processed + self.errored
    }
}

/// JSONL-based incoming message store
pub struct MessageStore {
    /// Path to the message JSONL file
    log_path: PathBuf,
}

impl MessageStore {
    /// Create a store over the given log file
    pub fn new(log_path: PathBuf) -> Self {
        Self { log_path }
    }

    /// Open a store, creating the parent directory if needed
    pub async fn open(log_path: PathBuf) -> Result<Self> {
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(Self::new(log_path))
    }

    /// Append an event to the message log
    async fn append_event(&self, event: &MessageEvent) -> Result<(), MessageStoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;

        let json = serde_json::to_string(event)?;
        file.write_all(format!("{}\n", json).as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    /// Replay all events to build current state
    pub async fn replay(&self) -> Result<HashMap<Uuid, IncomingMessage>, MessageStoreError> {
        let mut messages: HashMap<Uuid, IncomingMessage> = HashMap::new();

        if !self.log_path.exists() {
            return Ok(messages);
        }

        let file = File::open(&self.log_path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let event: MessageEvent = serde_json::from_str(&line)?;
            Self::apply_event(&mut messages, event);
        }

        Ok(messages)
    }

    /// Apply a single event to the state
    fn apply_event(messages: &mut HashMap<Uuid, IncomingMessage>, event: MessageEvent) {
        match event.event_type {
            MessageEventType::Received => {
                if let Some(data) = event.data {
                    if let Ok(msg) = serde_json::from_value::<IncomingMessage>(data) {
                        messages.insert(event.message_id, msg);
                    }
                }
            }
            MessageEventType::AttemptStarted => {
                if let Some(msg) = messages.get_mut(&event.message_id) {
                    msg.attempts += 1;
                    msg.last_attempt_at = Some(event.timestamp);
                }
            }
            MessageEventType::Processed => {
                if let Some(msg) = messages.get_mut(&event.message_id) {
                    msg.status = MessageStatus::Processed;
                    msg.error_message = None;
                }
            }
            MessageEventType::Errored => {
                if let Some(msg) = messages.get_mut(&event.message_id) {
                    msg.status = MessageStatus::Error;
                    if let Some(data) = event.data {
                        if let Some(error) = data.get("error").and_then(|e| e.as_str()) {
                            msg.error_message = Some(error.to_string());
                        }
                    }
                }
            }
        }
    }

    /// Persist a freshly received message (status must be Pending)
    pub async fn enqueue(&self, message: &IncomingMessage) -> Result<(), MessageStoreError> {
        let event = MessageEvent {
            timestamp: message.received_at,
            message_id: message.id,
            event_type: MessageEventType::Received,
            data: Some(serde_json::to_value(message)?),
        };
        self.append_event(&event).await
    }

    /// Get up to `limit` pending messages, oldest received first
    pub async fn pending(&self, limit: usize) -> Result<Vec<IncomingMessage>, MessageStoreError> {
        let messages = self.replay().await?;
        let mut pending: Vec<IncomingMessage> = messages
            .into_values()
            .filter(|m| m.status == MessageStatus::Pending)
            .collect();

        pending.sort_by(|a, b| a.received_at.cmp(&b.received_at));
        pending.truncate(limit);

        Ok(pending)
    }

    /// Record the start of a processing attempt. Rejects terminal messages.
    pub async fn record_attempt(&self, id: Uuid) -> Result<(), MessageStoreError> {
        let messages = self.replay().await?;
        let msg = messages.get(&id).ok_or(MessageStoreError::NotFound(id))?;

        if msg.status.is_terminal() {
            return Err(MessageStoreError::AlreadyTerminal {
                id,
                status: msg.status,
            });
        }

        let event = MessageEvent {
            timestamp: Utc::now(),
            message_id: id,
            event_type: MessageEventType::AttemptStarted,
            data: None,
        };
        self.append_event(&event).await
    }

    /// Mark a message as processed, clearing any error message
    pub async fn mark_processed(&self, id: Uuid) -> Result<(), MessageStoreError> {
        let event = MessageEvent {
            timestamp: Utc::now(),
            message_id: id,
            event_type: MessageEventType::Processed,
            data: None,
        };
        self.append_event(&event).await
    }

    /// Mark a message as errored with a failure reason
    pub async fn mark_error(&self, id: Uuid, error: &str) -> Result<(), MessageStoreError> {
        let event = MessageEvent {
            timestamp: Utc::now(),
            message_id: id,
            event_type: MessageEventType::Errored,
            data: Some(serde_json::json!({ "error": error })),
        };
        self.append_event(&event).await
    }

    /// Get a specific message by id
    pub async fn get(&self, id: Uuid) -> Result<Option<IncomingMessage>, MessageStoreError> {
        let messages = self.replay().await?;
        Ok(messages.get(&id).cloned())
    }

    /// Counts by status
    pub async fn counts(&self) -> Result<StoreCounts, MessageStoreError> {
        let messages = self.replay().await?;

        let mut counts = StoreCounts::default();
        for msg in messages.values() {
            match msg.status {
                MessageStatus::Pending => counts.pending += 1,
                MessageStatus::Processed => counts.processed += 1,
                MessageStatus::Error => counts.errored += 1,
            }
        }

        Ok(counts)
    }

    /// Most recently received messages, newest first
    pub async fn recent(&self, limit: usize) -> Result<Vec<IncomingMessage>, MessageStoreError> {
        let messages = self.replay().await?;
        let mut all: Vec<IncomingMessage> = messages.into_values().collect();
        all.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        all.truncate(limit);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (MessageStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("messages.jsonl");
        (MessageStore::new(path), temp)
    }

    fn sample_message(from: &str, body: &str) -> IncomingMessage {
        IncomingMessage::new(from.to_string(), body.to_string())
    }

    #[tokio::test]
    async fn test_enqueue_and_replay() {
        let (store, _temp) = create_test_store();

        let msg = sample_message("5511999990000", "Almoço | 35,90 | PIX");
        store.enqueue(&msg).await.unwrap();

        let loaded = store.get(msg.id).await.unwrap().unwrap();
        assert_eq!(loaded.from, "5511999990000");
        assert_eq!(loaded.status, MessageStatus::Pending);
        assert_eq!(loaded.attempts, 0);
    }

    #[tokio::test]
    async fn test_pending_sorted_oldest_first() {
        let (store, _temp) = create_test_store();

        let mut older = sample_message("551100000001", "a");
        older.received_at = Utc::now() - chrono::Duration::minutes(10);
        let newer = sample_message("551100000002", "b");

        // Enqueue newest first to prove sorting is by received_at
        store.enqueue(&newer).await.unwrap();
        store.enqueue(&older).await.unwrap();

        let pending = store.pending(50).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, older.id);
        assert_eq!(pending[1].id, newer.id);
    }

    #[tokio::test]
    async fn test_pending_respects_limit() {
        let (store, _temp) = create_test_store();

        for i in 0..5 {
            store
                .enqueue(&sample_message(&format!("55110000000{}", i), "x"))
                .await
                .unwrap();
        }

        let pending = store.pending(3).await.unwrap();
        assert_eq!(pending.len(), 3);
    }

    #[tokio::test]
    async fn test_attempt_increments_and_sets_timestamp() {
        let (store, _temp) = create_test_store();

        let msg = sample_message("5511999990000", "x");
        store.enqueue(&msg).await.unwrap();

        store.record_attempt(msg.id).await.unwrap();
        store.record_attempt(msg.id).await.unwrap();

        let loaded = store.get(msg.id).await.unwrap().unwrap();
        assert_eq!(loaded.attempts, 2);
        assert!(loaded.last_attempt_at.is_some());
    }

    #[tokio::test]
    async fn test_processed_clears_error() {
        let (store, _temp) = create_test_store();

        let msg = sample_message("5511999990000", "x");
        store.enqueue(&msg).await.unwrap();

        store.mark_error(msg.id, "boom").await.unwrap();
        let loaded = store.get(msg.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, MessageStatus::Error);
        assert_eq!(loaded.error_message.as_deref(), Some("boom"));

        store.mark_processed(msg.id).await.unwrap();
        let loaded = store.get(msg.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, MessageStatus::Processed);
        assert!(loaded.error_message.is_none());
    }

    #[tokio::test]
    async fn test_terminal_messages_reject_attempts() {
        let (store, _temp) = create_test_store();

        let msg = sample_message("5511999990000", "x");
        store.enqueue(&msg).await.unwrap();
        store.mark_error(msg.id, "boom").await.unwrap();

        let result = store.record_attempt(msg.id).await;
        assert!(matches!(
            result,
            Err(MessageStoreError::AlreadyTerminal { .. })
        ));
    }

    #[tokio::test]
    async fn test_errored_messages_leave_pending_queue() {
        let (store, _temp) = create_test_store();

        let msg = sample_message("5511999990000", "x");
        store.enqueue(&msg).await.unwrap();
        store.mark_error(msg.id, "boom").await.unwrap();

        assert!(store.pending(50).await.unwrap().is_empty());

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.errored, 1);
        assert_eq!(counts.total(), 1);
    }
}
