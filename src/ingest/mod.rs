//! Webhook intake: HTTP server, payload processing, phone normalization.

pub mod server;
pub mod webhook;

pub use server::AppContext;
pub use webhook::{normalize_phone, WebhookReport, WebhookService};
