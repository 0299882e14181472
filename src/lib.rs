//! zapgasto - WhatsApp expense ingestion pipeline
//!
//! Turns WhatsApp chat messages (text or voice) into structured expense
//! records. The pipeline is split in two halves joined by a durable queue:
//!
//! - The webhook ingestor accepts provider callbacks, transcribes audio and
//!   appends every resolved message to an append-only JSONL log as Pending.
//! - The batch processor claims pending messages on a fixed-delay timer,
//!   resolves the owning user by phone, extracts a structured expense (OpenAI
//!   structured output, or the offline heuristic parser when no real
//!   credential is configured), commits it and notifies the sender.
//!
//! Message state is derived by replaying the event log, so a crash between
//! batches loses nothing.
//!
//! # Modules
//!
//! - `adapters`: External system integrations (WhatsApp Cloud API, OpenAI)
//! - `core`: Batch processing of queued messages
//! - `domain`: Data structures (Expense, IncomingMessage)
//! - `extract`: Extraction strategies (OpenAI, heuristic)
//! - `ingest`: Webhook server and payload intake
//! - `store`: Durable stores (message log, expenses, users)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the webhook server with the background processor
//! zapgasto serve
//!
//! # Drain one batch by hand
//! zapgasto process
//!
//! # Inspect the queue
//! zapgasto status
//!
//! # Try the heuristic parser
//! zapgasto parse "Despesa: Almoço; Valor: 35,90; Pagamento: PIX"
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod extract;
pub mod ingest;
pub mod store;

// Re-export main types at crate root for convenience
pub use crate::core::{BatchReport, MessageProcessor};
pub use domain::{Category, Expense, IncomingMessage, MessageStatus, PaymentMethod};
pub use extract::{build_extractor, ExpenseExtractor, HeuristicExtractor};
pub use ingest::{normalize_phone, WebhookReport, WebhookService};
pub use store::{JsonExpenseStore, JsonUserDirectory, MessageStore, User};
