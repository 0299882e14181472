//! Durable state: incoming message log, expense store, user directory.

pub mod expenses;
pub mod messages;
pub mod users;

pub use expenses::JsonExpenseStore;
pub use messages::{MessageStore, MessageStoreError, StoreCounts};
pub use users::{JsonUserDirectory, User};
