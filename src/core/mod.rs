//! Batch processing of queued messages into committed expenses.

pub mod processor;

pub use processor::{format_currency, BatchReport, MessageProcessor};
