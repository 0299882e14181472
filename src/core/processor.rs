//! Batch processor for pending incoming messages.
//!
//! Runs on a fixed-delay timer: each invocation claims the oldest pending
//! messages and processes them strictly sequentially. Every failure in the
//! per-message chain (owner lookup, extraction, commit) lands as a terminal
//! Error status with a human-readable reason; errored messages are not
//! re-queued. Notifications back to the sender are best-effort only.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};

use crate::adapters::{ExpenseSink, Notifier, UserDirectory};
use crate::domain::{Expense, IncomingMessage};
use crate::extract::ExpenseExtractor;
use crate::store::MessageStore;

/// Outcome of one batch invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Messages claimed from the pending queue
    pub claimed: usize,
    /// Messages that transitioned to Processed
    pub processed: usize,
    /// Messages that transitioned to Error
    pub errored: usize,
}

/// Retry processor over the incoming message store.
pub struct MessageProcessor {
    store: Arc<MessageStore>,
    users: Arc<dyn UserDirectory>,
    expenses: Arc<dyn ExpenseSink>,
    extractor: Arc<dyn ExpenseExtractor>,
    notifier: Arc<dyn Notifier>,
    locale: String,
    batch_size: usize,
}

impl MessageProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<MessageStore>,
        users: Arc<dyn UserDirectory>,
        expenses: Arc<dyn ExpenseSink>,
        extractor: Arc<dyn ExpenseExtractor>,
        notifier: Arc<dyn Notifier>,
        locale: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            users,
            expenses,
            extractor,
            notifier,
            locale: locale.into(),
            batch_size,
        }
    }

    /// Claim and process one batch of pending messages.
    #[instrument(skip(self))]
    pub async fn process_pending(&self) -> Result<BatchReport> {
        let pending = self.store.pending(self.batch_size).await?;
        let mut report = BatchReport {
            claimed: pending.len(),
            ..Default::default()
        };

        if pending.is_empty() {
            return Ok(report);
        }
        info!(claimed = pending.len(), "Processing pending messages");

        for msg in pending {
            if let Err(e) = self.store.record_attempt(msg.id).await {
                // Attempt bookkeeping failed; leave the message for the next run
                warn!(message_id = %msg.id, error = %e, "Failed to record attempt");
                continue;
            }

            match self.try_commit(&msg).await {
                Ok(expense) => {
                    if let Err(e) = self.store.mark_processed(msg.id).await {
                        warn!(message_id = %msg.id, error = %e, "Failed to mark processed");
                    }
                    report.processed += 1;
                    info!(
                        message_id = %msg.id,
                        expense_id = ?expense.id,
                        "Expense committed"
                    );
                    self.notify(&msg.from, &self.success_body(&expense)).await;
                }
                Err(reason) => {
                    if let Err(e) = self.store.mark_error(msg.id, &reason).await {
                        warn!(message_id = %msg.id, error = %e, "Failed to mark errored");
                    }
                    report.errored += 1;
                    warn!(message_id = %msg.id, %reason, "Failed to process message");
                    self.notify(&msg.from, &self.error_body(&reason)).await;
                }
            }
        }

        Ok(report)
    }

    /// Resolve ownership, extract, and commit. Returns the committed expense
    /// or a human-readable failure reason for the message record.
    async fn try_commit(&self, msg: &IncomingMessage) -> Result<Expense, String> {
        let owner_id = self
            .users
            .find_user_id_by_phone(&msg.from)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("Usuario nao encontrado para telefone: {}", msg.from))?;

        let mut expense = self
            .extractor
            .extract(&msg.body, &owner_id)
            .await
            .ok_or_else(|| format!("Mensagem invalida: {}", msg.body))?;

        // Ownership comes from the resolved phone lookup, never from the
        // extracted payload
        expense.owner_id = owner_id;

        self.expenses
            .commit(expense)
            .await
            .map_err(|e| e.to_string())
    }

    /// Best-effort notification; failures are logged and swallowed.
    async fn notify(&self, to: &str, body: &str) {
        if let Err(e) = self.notifier.send_text(to, body).await {
            warn!(%to, error = %e, "Failed to send notification");
        }
    }

    fn success_body(&self, expense: &Expense) -> String {
        format!(
            "✅ Despesa registrada com sucesso!\n\
             Descrição: {}\n\
             Valor: {}\n\
             Pagamento: {}\n\
             Quando: {}",
            expense.description,
            format_currency(expense.amount, &self.locale),
            expense.payment_method.label(),
            expense.timestamp.format("%d/%m/%Y %H:%M"),
        )
    }

    fn error_body(&self, reason: &str) -> String {
        format!(
            "⚠️ Não consegui registrar sua despesa. Motivo: {}\n\
             Exemplos válidos:\n\
             • Despesa: Almoço; Valor: 35,90; Pagamento: PIX\n\
             • Mercado | 120.50 | CARTAO CREDITO",
            reason
        )
    }

    /// Run forever with a fixed delay between batches. The next run is only
    /// scheduled after the previous one finished, so invocations never
    /// overlap.
    pub async fn run_loop(self: Arc<Self>, period: Duration) {
        info!(period_secs = period.as_secs(), "Message processor started");
        loop {
            match self.process_pending().await {
                Ok(report) if report.claimed > 0 => {
                    info!(
                        claimed = report.claimed,
                        processed = report.processed,
                        errored = report.errored,
                        "Batch finished"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Batch failed"),
            }
            tokio::time::sleep(period).await;
        }
    }
}

/// Format an amount as currency for the configured locale.
///
/// pt locales use the Brazilian convention (`R$ 1.234,56`); anything else
/// gets a generic `$ 1,234.56`.
pub fn format_currency(amount: Decimal, locale: &str) -> String {
    let rounded = amount.round_dp(2);
    let text = format!("{:.2}", rounded);
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let (symbol, group_sep, decimal_sep) = if locale.to_lowercase().starts_with("pt") {
        ("R$", '.', ',')
    } else {
        ("$", ',', '.')
    };

    let digits: Vec<char> = int_part.chars().filter(|c| c.is_ascii_digit()).collect();
    let mut grouped = String::new();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(group_sep);
        }
        grouped.push(*c);
    }

    let sign = if amount.is_sign_negative() { "-" } else { "" };
    format!("{} {}{}{}{}", symbol, sign, grouped, decimal_sep, frac_part)
}
