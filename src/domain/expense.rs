//! Expense domain model and the closed payment/category enumerations.
//!
//! An Expense is only ever produced by the extraction pipeline and committed
//! through an [`crate::adapters::ExpenseSink`]. Wire names for the enums are
//! the upper-case Portuguese forms used by the messaging integration.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the expense was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Dinheiro,
    Pix,
    CartaoCredito,
    CartaoDebito,
    ValeRefeicao,
    ValeAlimentacao,
    Voucher,
}

impl PaymentMethod {
    /// All variants, in schema order.
    pub const ALL: [PaymentMethod; 7] = [
        Self::Dinheiro,
        Self::Pix,
        Self::CartaoCredito,
        Self::CartaoDebito,
        Self::ValeRefeicao,
        Self::ValeAlimentacao,
        Self::Voucher,
    ];

    /// Wire name (upper snake case, as sent to and from the AI schema).
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Dinheiro => "DINHEIRO",
            Self::Pix => "PIX",
            Self::CartaoCredito => "CARTAO_CREDITO",
            Self::CartaoDebito => "CARTAO_DEBITO",
            Self::ValeRefeicao => "VALE_REFEICAO",
            Self::ValeAlimentacao => "VALE_ALIMENTACAO",
            Self::Voucher => "VOUCHER",
        }
    }

    /// Parse an exact wire name (spaces are accepted in place of underscores).
    pub fn from_wire_name(raw: &str) -> Option<Self> {
        let key = raw.trim().to_uppercase().replace(' ', "_");
        Self::ALL.iter().copied().find(|p| p.wire_name() == key)
    }

    /// Human-readable label for notifications ("CARTAO CREDITO").
    pub fn label(&self) -> String {
        self.wire_name().replace('_', " ")
    }
}

/// Spending category, inferred when the sender does not state one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Alimentacao,
    Mercado,
    Educacao,
    Lazer,
    ContasDoDiaADia,
    Outras,
}

impl Category {
    /// All variants, in schema order.
    pub const ALL: [Category; 6] = [
        Self::Alimentacao,
        Self::Mercado,
        Self::Educacao,
        Self::Lazer,
        Self::ContasDoDiaADia,
        Self::Outras,
    ];

    /// Wire name (upper snake case).
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Alimentacao => "ALIMENTACAO",
            Self::Mercado => "MERCADO",
            Self::Educacao => "EDUCACAO",
            Self::Lazer => "LAZER",
            Self::ContasDoDiaADia => "CONTAS_DO_DIA_A_DIA",
            Self::Outras => "OUTRAS",
        }
    }

    /// Parse an exact wire name (spaces are accepted in place of underscores).
    pub fn from_wire_name(raw: &str) -> Option<Self> {
        let key = raw.trim().to_uppercase().replace(' ', "_");
        Self::ALL.iter().copied().find(|c| c.wire_name() == key)
    }
}

/// A single financial expense attributed to an owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    /// Assigned by the expense store on commit.
    pub id: Option<Uuid>,

    /// Free-text description ("Almoço", "Mercado").
    pub description: String,

    /// Amount spent, strictly positive.
    pub amount: Decimal,

    /// When the expense happened.
    pub timestamp: DateTime<Utc>,

    /// How it was paid.
    pub payment_method: PaymentMethod,

    /// Spending category.
    pub category: Category,

    /// Resolved user id of the sender.
    pub owner_id: String,
}

impl Expense {
    /// Validate invariants before committing.
    ///
    /// Messages are surfaced verbatim on the owning incoming message, so they
    /// are phrased for the end user.
    pub fn validate(&self) -> Result<(), String> {
        if self.description.trim().is_empty() {
            return Err("Descricao obrigatoria".to_string());
        }
        if self.amount <= Decimal::ZERO {
            return Err("Valor deve ser positivo".to_string());
        }
        if self.owner_id.trim().is_empty() {
            return Err("Proprietario obrigatorio".to_string());
        }
        Ok(())
    }
}
