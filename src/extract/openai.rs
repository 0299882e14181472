//! Structured expense extraction via the OpenAI chat-completion API.
//!
//! The model is instructed to answer with JSON matching a fixed schema
//! (descricao, valor, tipoPagamento, dataHora, categoria), temperature pinned
//! to 0. Every failure mode collapses to `None`: the retry processor treats a
//! missing result the same as an unparseable message.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::OpenAiSettings;
use crate::domain::{Category, Expense, PaymentMethod};

use super::heuristic::infer_category;
use super::ExpenseExtractor;

/// System prompt instructing the model to emit schema-conforming JSON only.
const SYSTEM_PROMPT: &str = "\
Você é um assistente que extrai uma Despesa a partir de mensagens de WhatsApp em linguagem natural. \
Sempre responda apenas com JSON válido aderente ao schema. Campos: descricao (string), valor (number), \
tipoPagamento (DINHEIRO|PIX|CARTAO_CREDITO|CARTAO_DEBITO|VALE_REFEICAO|VALE_ALIMENTACAO|VOUCHER), \
dataHora (ISO-8601), categoria (ALIMENTACAO|MERCADO|EDUCACAO|LAZER|CONTAS_DO_DIA_A_DIA|OUTRAS) \
inferida a partir da descrição. Se a mensagem não for uma despesa, responda apenas com um JSON com \
campos mínimos faltando que fará a validação falhar. Idioma: pt-BR. \
Se não conseguir extrair a data e hora, pode retornar o campo nulo.";

/// Date-time patterns tried after strict ISO-8601, most specific first.
const DATE_PATTERNS: [&str; 8] = [
    "%d/%m/%Y, %H:%M:%S",
    "%d/%m/%Y, %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

const DATE_ONLY_PATTERN: &str = "%d/%m/%Y";

/// Remote extraction strategy.
pub struct OpenAiExtractor {
    settings: OpenAiSettings,
    locale: String,
    client: reqwest::Client,
}

impl OpenAiExtractor {
    pub fn new(settings: OpenAiSettings, locale: impl Into<String>, timeout: Duration) -> Self {
        Self {
            settings,
            locale: locale.into(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    fn build_request(&self, raw: &str) -> Value {
        json!({
            "model": self.settings.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!("Locale={}\nMensagem=\n{}", self.locale, raw),
                },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "DespesaSchema",
                    "schema": {
                        "type": "object",
                        "required": ["descricao", "valor", "tipoPagamento"],
                        "properties": {
                            "descricao": { "type": "string" },
                            "valor": { "type": "number" },
                            "tipoPagamento": {
                                "type": "string",
                                "enum": PaymentMethod::ALL.iter().map(|p| p.wire_name()).collect::<Vec<_>>(),
                            },
                            "dataHora": { "type": "string", "format": "date-time" },
                            "categoria": {
                                "type": "string",
                                "enum": Category::ALL.iter().map(|c| c.wire_name()).collect::<Vec<_>>(),
                            },
                        },
                    },
                },
            },
        })
    }

    async fn call(&self, raw: &str, owner_id: &str) -> Result<Expense> {
        let url = format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&self.build_request(raw))
            .send()
            .await
            .context("Failed to call chat completion endpoint")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Chat completion returned status {}", status);
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        let content = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .context("Chat completion returned no content")?;

        let candidate: Value =
            serde_json::from_str(content).context("Model content is not valid JSON")?;

        let expense = self.map_candidate(&candidate, owner_id)?;
        expense.validate().map_err(anyhow::Error::msg)?;
        Ok(expense)
    }

    fn map_candidate(&self, json: &Value, owner_id: &str) -> Result<Expense> {
        let description = json
            .get("descricao")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();

        let amount = json
            .get("valor")
            .and_then(as_decimal)
            .context("Campo valor ausente ou invalido")?;

        let payment_method = json
            .get("tipoPagamento")
            .and_then(|v| v.as_str())
            .and_then(PaymentMethod::from_wire_name)
            .context("Campo tipoPagamento ausente ou invalido")?;

        let timestamp = json
            .get("dataHora")
            .and_then(|v| v.as_str())
            .and_then(parse_flexible_datetime)
            .unwrap_or_else(Utc::now);

        let category = json
            .get("categoria")
            .and_then(|v| v.as_str())
            .and_then(parse_category)
            .unwrap_or_else(|| infer_category(&description));

        Ok(Expense {
            id: None,
            description,
            amount,
            timestamp,
            payment_method,
            category,
            owner_id: owner_id.to_string(),
        })
    }
}

#[async_trait]
impl ExpenseExtractor for OpenAiExtractor {
    fn name(&self) -> &str {
        "openai"
    }

    async fn extract(&self, raw: &str, owner_id: &str) -> Option<Expense> {
        if raw.trim().is_empty() {
            return None;
        }
        match self.call(raw, owner_id).await {
            Ok(expense) => Some(expense),
            Err(e) => {
                warn!(error = %e, "Structured extraction failed");
                None
            }
        }
    }
}

fn as_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Parse a date-time string: strict ISO-8601 first, then the ordered list of
/// day/month/year patterns, then a bare date at midnight. `None` if all fail.
pub fn parse_flexible_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for pattern in DATE_PATTERNS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, pattern) {
            return Some(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, DATE_ONLY_PATTERN) {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }

    None
}

/// Match a category name after upper-casing and folding common accents
/// ("Educação" → "EDUCACAO"). `None` when no variant matches.
pub fn parse_category(raw: &str) -> Option<Category> {
    let folded: String = raw
        .trim()
        .to_uppercase()
        .chars()
        .map(|c| match c {
            'Ã' | 'Á' | 'À' | 'Â' => 'A',
            'Ç' => 'C',
            'É' | 'Ê' => 'E',
            'Í' => 'I',
            'Ó' | 'Õ' | 'Ô' => 'O',
            'Ú' => 'U',
            other => other,
        })
        .collect();
    Category::from_wire_name(&folded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_iso_datetime_parses_first() {
        let dt = parse_flexible_datetime("2024-03-10T14:30:00Z").unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.hour(), 14);
    }

    #[test]
    fn test_locale_patterns() {
        let dt = parse_flexible_datetime("10/03/2024 14:30").unwrap();
        assert_eq!((dt.day(), dt.month(), dt.year()), (10, 3, 2024));
        assert_eq!((dt.hour(), dt.minute()), (14, 30));

        let dt = parse_flexible_datetime("10/03/2024, 14:30:45").unwrap();
        assert_eq!(dt.second(), 45);

        let dt = parse_flexible_datetime("10-03-2024 08:00").unwrap();
        assert_eq!(dt.hour(), 8);

        let dt = parse_flexible_datetime("10.03.2024 08:00:01").unwrap();
        assert_eq!(dt.second(), 1);
    }

    #[test]
    fn test_date_only_is_midnight() {
        let dt = parse_flexible_datetime("25/12/2024").unwrap();
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (0, 0, 0));
    }

    #[test]
    fn test_garbage_datetime_is_none() {
        assert!(parse_flexible_datetime("amanhã de manhã").is_none());
        assert!(parse_flexible_datetime("").is_none());
    }

    #[test]
    fn test_category_accent_folding() {
        assert_eq!(parse_category("Educação"), Some(Category::Educacao));
        assert_eq!(parse_category("ALIMENTAÇÃO"), Some(Category::Alimentacao));
        assert_eq!(parse_category("lazer"), Some(Category::Lazer));
        assert_eq!(
            parse_category("contas do dia a dia"),
            Some(Category::ContasDoDiaADia)
        );
        assert_eq!(parse_category("inexistente"), None);
    }

    #[test]
    fn test_candidate_mapping_defaults() {
        let extractor = OpenAiExtractor::new(
            crate::config::OpenAiSettings {
                api_key: "sk-real".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
            },
            "pt-BR",
            Duration::from_secs(5),
        );

        let candidate = json!({
            "descricao": "Almoço no restaurante",
            "valor": 35.9,
            "tipoPagamento": "PIX",
            "dataHora": null,
            "categoria": "não-existe",
        });
        let e = extractor.map_candidate(&candidate, "user-1").unwrap();
        assert_eq!(e.payment_method, PaymentMethod::Pix);
        // unknown category falls back to the keyword heuristic
        assert_eq!(e.category, Category::Alimentacao);
        assert_eq!(e.owner_id, "user-1");
    }

    #[test]
    fn test_candidate_missing_amount_fails() {
        let extractor = OpenAiExtractor::new(
            crate::config::OpenAiSettings {
                api_key: "sk-real".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
            },
            "pt-BR",
            Duration::from_secs(5),
        );

        let candidate = json!({ "descricao": "algo", "tipoPagamento": "PIX" });
        assert!(extractor.map_candidate(&candidate, "user-1").is_err());
    }
}
