//! Expense extraction strategies.
//!
//! Two interchangeable implementations behind one trait: a remote structured
//! extraction via the OpenAI chat-completion API, and the offline heuristic
//! parser. The strategy is selected once at construction, based on whether a
//! real API credential is configured.

pub mod heuristic;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ResolvedConfig;
use crate::domain::Expense;

pub use openai::OpenAiExtractor;

/// Strategy for turning raw message text into an expense candidate.
///
/// Implementations absorb every failure (transport, parsing, validation) and
/// return `None`; the caller treats any `None` as "could not extract".
#[async_trait]
pub trait ExpenseExtractor: Send + Sync {
    /// Human-readable strategy name, for logs.
    fn name(&self) -> &str;

    /// Extract an expense owned by `owner_id` from `raw`, or `None`.
    async fn extract(&self, raw: &str, owner_id: &str) -> Option<Expense>;
}

/// Offline extractor wrapping the heuristic parser.
pub struct HeuristicExtractor {
    locale: String,
}

impl HeuristicExtractor {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
        }
    }
}

#[async_trait]
impl ExpenseExtractor for HeuristicExtractor {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn extract(&self, raw: &str, owner_id: &str) -> Option<Expense> {
        heuristic::try_parse(raw, owner_id, &self.locale)
    }
}

/// Select the extraction strategy for the given configuration.
///
/// A fake OpenAI key keeps dev and test fully offline by delegating to the
/// heuristic parser, functionally equivalent to the remote path being down.
pub fn build_extractor(cfg: &ResolvedConfig) -> Arc<dyn ExpenseExtractor> {
    if cfg.openai.is_fake_key() {
        tracing::debug!("Fake OpenAI key configured, using heuristic extractor");
        Arc::new(HeuristicExtractor::new(cfg.locale.clone()))
    } else {
        Arc::new(OpenAiExtractor::new(
            cfg.openai.clone(),
            cfg.locale.clone(),
            cfg.http_timeout,
        ))
    }
}
