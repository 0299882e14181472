//! Adapter interfaces for external collaborators.
//!
//! The pipeline only assumes three capabilities from the outside world: a
//! user directory keyed by phone number, a sink that persists validated
//! expenses, and a way to send a text notification back to a phone number.

pub mod transcriber;
pub mod whatsapp;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::Expense;

pub use transcriber::OpenAiTranscriber;
pub use whatsapp::WhatsAppClient;

/// Resolves the owning user for a sender phone number.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns the user id registered for `phone` (canonical digits), or
    /// `None` when no user matches.
    async fn find_user_id_by_phone(&self, phone: &str) -> Result<Option<String>>;
}

/// Persists validated expenses.
#[async_trait]
pub trait ExpenseSink: Send + Sync {
    /// Re-validates and persists the expense, returning it with an id.
    async fn commit(&self, expense: Expense) -> Result<Expense>;
}

/// Sends text notifications to a phone number. Callers treat failures as
/// best-effort: a lost notification never changes message state.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<()>;
}
