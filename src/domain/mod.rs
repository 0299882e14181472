//! Domain types for the expense ingestion pipeline.
//!
//! This module contains the core data structures:
//! - Expense: the extracted financial record, with its closed enumerations
//! - IncomingMessage: durable record of one inbound chat message

pub mod expense;
pub mod message;

// Re-export commonly used types
pub use expense::{Category, Expense, PaymentMethod};
pub use message::{IncomingMessage, MessageStatus};
