//! Offline deterministic expense parser.
//!
//! Recognizes three textual shapes, first match wins:
//! 1. `Despesa: X; Valor: Y; Pagamento: Z`
//! 2. `X | Y | Z`
//! 3. Last resort: split into at least three tokens on ` | `, ` ;` or runs
//!    of two-plus spaces
//!
//! Also hosts the amount and category heuristics shared with the AI path.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use rust_decimal::Decimal;

use crate::domain::{Category, Expense, PaymentMethod};

static PATTERN_SEMICOLON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*despesa\s*[:=]\s*(.+?)\s*;\s*valor\s*[:=]\s*([0-9.,]+)\s*;\s*pagamento\s*[:=]\s*([\n\r\t A-ZÇÃÕÁÉÍÓÚÂÊÔ-]+)\s*$",
    )
    .expect("semicolon pattern")
});

static PATTERN_PIPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(.+?)\s*\|\s*([0-9.,]+)\s*\|\s*([A-ZÇÃÕÁÉÍÓÚÂÊÔ ]+)\s*$")
        .expect("pipe pattern")
});

static TOKEN_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\|\s+|\s+;").expect("token split pattern"));

static DOUBLE_SPACE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("double space pattern"));

/// Try to extract an expense from raw message text. Returns `None` when no
/// supported shape matches or a field fails to parse.
pub fn try_parse(text: &str, owner_id: &str, locale: &str) -> Option<Expense> {
    if text.trim().is_empty() {
        return None;
    }
    let body = text.trim();

    if let Some(caps) = PATTERN_SEMICOLON.captures(body) {
        return build_expense(&caps[1], &caps[2], &caps[3], owner_id, locale);
    }
    if let Some(caps) = PATTERN_PIPE.captures(body) {
        return build_expense(&caps[1], &caps[2], &caps[3], owner_id, locale);
    }

    // Last resort: token shapes
    let mut parts: Vec<&str> = TOKEN_SPLIT.split(body).collect();
    if parts.len() < 3 {
        parts = DOUBLE_SPACE_SPLIT.split(body).collect();
    }
    if parts.len() >= 3 {
        return build_expense(parts[0], parts[1], parts[2], owner_id, locale);
    }

    None
}

fn build_expense(
    description_raw: &str,
    amount_raw: &str,
    payment_raw: &str,
    owner_id: &str,
    locale: &str,
) -> Option<Expense> {
    let description = description_raw.trim();
    if description.is_empty() {
        return None;
    }
    let amount = parse_amount(amount_raw, locale)?;
    let payment_method = parse_payment(payment_raw)?;

    // The heuristic path carries no timestamp in the input text
    Some(Expense {
        id: None,
        description: description.to_string(),
        amount,
        timestamp: Utc::now(),
        payment_method,
        category: infer_category(description),
        owner_id: owner_id.to_string(),
    })
}

/// Parse an amount string accepting both `12.34` and `12,34`.
///
/// When both separators are present, the right-most one is the decimal point
/// and the other is stripped as a thousands separator. A lone comma is always
/// decimal. Falls back to a locale-aware parse as last resort.
pub fn parse_amount(raw: &str, locale: &str) -> Option<Decimal> {
    let mut s = raw.trim().to_string();
    if s.is_empty() {
        return None;
    }

    if s.contains(',') && s.contains('.') {
        if s.rfind(',') > s.rfind('.') {
            s = s.replace('.', "").replace(',', ".");
        } else {
            s = s.replace(',', "");
        }
    } else if s.contains(',') {
        s = s.replace('.', "").replace(',', ".");
    }

    match Decimal::from_str(&s) {
        Ok(v) => Some(v),
        Err(_) => parse_amount_localized(raw, locale),
    }
}

/// Locale-aware numeric parse: pt-style locales treat `,` as the decimal
/// separator and `.` as grouping; everything else the other way around.
fn parse_amount_localized(raw: &str, locale: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    let normalized = if locale.to_lowercase().starts_with("pt") {
        trimmed.replace('.', "").replace(',', ".")
    } else {
        trimmed.replace(',', "")
    };
    Decimal::from_str(&normalized).ok()
}

/// Resolve a payment method from free text via the alias table, falling back
/// to a direct wire-name match.
pub fn parse_payment(raw: &str) -> Option<PaymentMethod> {
    let key = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
    match key.as_str() {
        "DINHEIRO" | "CASH" => Some(PaymentMethod::Dinheiro),
        "PIX" => Some(PaymentMethod::Pix),
        "CARTAO" | "CARTAO CREDITO" | "CREDITO" => Some(PaymentMethod::CartaoCredito),
        "CARTAO DEBITO" | "DEBITO" => Some(PaymentMethod::CartaoDebito),
        _ => PaymentMethod::from_wire_name(&key),
    }
}

static KW_ALIMENTACAO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(almo(c|ç)o|jantar|comida|restaurante|lanche|hamb(ur|ú)guer|pizza|padaria|refe(i|í)cao|marmita|bar)\b")
        .expect("alimentacao keywords")
});

static KW_MERCADO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(mercado|supermercado|compras|hortifruti|a(c|ç)ougue|sacolão|atacado)\b")
        .expect("mercado keywords")
});

static KW_EDUCACAO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(curso|faculdade|escola|mensalidade|material|livro|aluno|ensino|ead|matr(i|í)cula)\b")
        .expect("educacao keywords")
});

static KW_LAZER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(cinema|lazer|viagem|passeio|parque|show|assinatura|netflix|spotify|game|jogo)\b")
        .expect("lazer keywords")
});

static KW_CONTAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(luz|energia|agua|internet|telefone|aluguel|condominio|gas|conta|boleto)\b")
        .expect("contas keywords")
});

/// Infer a category from keywords in the description. Defaults to `Outras`.
pub fn infer_category(description: &str) -> Category {
    let desc = description.to_lowercase();
    if KW_ALIMENTACAO.is_match(&desc) {
        return Category::Alimentacao;
    }
    if KW_MERCADO.is_match(&desc) {
        return Category::Mercado;
    }
    if KW_EDUCACAO.is_match(&desc) {
        return Category::Educacao;
    }
    if KW_LAZER.is_match(&desc) {
        return Category::Lazer;
    }
    if KW_CONTAS.is_match(&desc) {
        return Category::ContasDoDiaADia;
    }
    Category::Outras
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCALE: &str = "pt-BR";

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_semicolon_shape() {
        let e = try_parse(
            "Despesa: Almoço; Valor: 35,90; Pagamento: PIX",
            "user-1",
            LOCALE,
        )
        .unwrap();
        assert_eq!(e.description, "Almoço");
        assert_eq!(e.amount, dec("35.90"));
        assert_eq!(e.payment_method, PaymentMethod::Pix);
        assert_eq!(e.category, Category::Alimentacao);
        assert_eq!(e.owner_id, "user-1");
    }

    #[test]
    fn test_pipe_shape() {
        let e = try_parse("Mercado | 120.50 | CARTAO CREDITO", "user-1", LOCALE).unwrap();
        assert_eq!(e.description, "Mercado");
        assert_eq!(e.amount, dec("120.50"));
        assert_eq!(e.payment_method, PaymentMethod::CartaoCredito);
        assert_eq!(e.category, Category::Mercado);
    }

    #[test]
    fn test_token_fallback_double_space() {
        let e = try_parse("Cinema  42,00  DEBITO", "user-1", LOCALE).unwrap();
        assert_eq!(e.description, "Cinema");
        assert_eq!(e.amount, dec("42.00"));
        assert_eq!(e.payment_method, PaymentMethod::CartaoDebito);
        assert_eq!(e.category, Category::Lazer);
    }

    #[test]
    fn test_no_shape_matches() {
        assert!(try_parse("bom dia", "user-1", LOCALE).is_none());
        assert!(try_parse("", "user-1", LOCALE).is_none());
        assert!(try_parse("   ", "user-1", LOCALE).is_none());
    }

    #[test]
    fn test_unknown_payment_rejects() {
        assert!(try_parse("Almoço | 35,90 | BITCOIN", "user-1", LOCALE).is_none());
    }

    #[test]
    fn test_amount_rightmost_separator_is_decimal() {
        assert_eq!(parse_amount("1.234,56", LOCALE), Some(dec("1234.56")));
        assert_eq!(parse_amount("1,234.56", LOCALE), Some(dec("1234.56")));
        assert_eq!(parse_amount("12,34", LOCALE), Some(dec("12.34")));
        assert_eq!(parse_amount("12.34", LOCALE), Some(dec("12.34")));
        assert_eq!(parse_amount("120", LOCALE), Some(dec("120")));
        assert_eq!(parse_amount("abc", LOCALE), None);
    }

    #[test]
    fn test_payment_aliases() {
        assert_eq!(parse_payment("CASH"), Some(PaymentMethod::Dinheiro));
        assert_eq!(parse_payment("credito"), Some(PaymentMethod::CartaoCredito));
        assert_eq!(parse_payment("cartao"), Some(PaymentMethod::CartaoCredito));
        assert_eq!(parse_payment(" debito "), Some(PaymentMethod::CartaoDebito));
        assert_eq!(
            parse_payment("VALE REFEICAO"),
            Some(PaymentMethod::ValeRefeicao)
        );
        assert_eq!(parse_payment("cheque"), None);
    }

    #[test]
    fn test_category_keywords() {
        assert_eq!(infer_category("Jantar no restaurante"), Category::Alimentacao);
        assert_eq!(infer_category("Compras no supermercado"), Category::Mercado);
        assert_eq!(infer_category("Mensalidade da faculdade"), Category::Educacao);
        assert_eq!(infer_category("Assinatura netflix"), Category::Lazer);
        assert_eq!(infer_category("Conta de luz"), Category::ContasDoDiaADia);
        assert_eq!(infer_category("Presente de aniversario"), Category::Outras);
    }
}
