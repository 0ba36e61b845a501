use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::category::CategoryId;
use crate::currency::CurrencyId;
use crate::money::Money;
use crate::pattern::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    /// Negative amounts are money leaving the account.
    pub fn from_amount(amount: Money) -> Self {
        if amount.is_negative() {
            TransactionType::Expense
        } else {
            TransactionType::Income
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Income => write!(f, "income"),
            TransactionType::Expense => write!(f, "expense"),
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(TransactionType::Income),
            "expense" => Ok(TransactionType::Expense),
            other => Err(format!("Unknown transaction type: '{other}'")),
        }
    }
}

/// A category decision made by the user, which always wins over matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplicitCategory {
    Assign(CategoryId),
    Clear,
}

impl ExplicitCategory {
    pub fn category_id(self) -> Option<CategoryId> {
        match self {
            ExplicitCategory::Assign(id) => Some(id),
            ExplicitCategory::Clear => None,
        }
    }
}

/// One row as produced by statement extraction, before categorization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTransactionCandidate {
    pub description: String,
    /// English rendition of `description`; preferred for matching.
    #[serde(default)]
    pub translated_description: Option<String>,
    pub amount: Money,
    /// Date as extracted. Parsed with [`parse_transaction_date`].
    pub date: String,
    /// Category name suggested by the extraction service.
    #[serde(default)]
    pub suggested_category: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub user_category: Option<ExplicitCategory>,
    #[serde(default)]
    pub currency_id: Option<CurrencyId>,
}

impl RawTransactionCandidate {
    pub fn new(description: &str, amount: Money, date: &str) -> Self {
        RawTransactionCandidate {
            description: description.to_string(),
            amount,
            date: date.to_string(),
            ..Default::default()
        }
    }

    /// The text used for matching: the translation when non-blank, else the original.
    pub fn matching_text(&self) -> &str {
        match self.translated_description.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => &self.description,
        }
    }

    pub fn transaction_type(&self) -> TransactionType {
        TransactionType::from_amount(self.amount)
    }

    pub fn parsed_date(&self) -> Option<NaiveDate> {
        parse_transaction_date(&self.date)
    }
}

/// The persistable result of importing one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTransaction {
    pub user_id: UserId,
    pub transaction_type: TransactionType,
    /// Always non-negative; direction lives in `transaction_type`.
    pub amount: Money,
    pub description: String,
    pub date: NaiveDate,
    pub category_id: Option<CategoryId>,
    pub currency_id: CurrencyId,
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d"];

/// Accepts the date shapes bank statements come in, plus RFC 3339 timestamps.
pub fn parse_transaction_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn type_follows_sign() {
        assert_eq!(TransactionType::from_amount(Money::from_cents(-100)), TransactionType::Expense);
        assert_eq!(TransactionType::from_amount(Money::from_cents(100)), TransactionType::Income);
    }

    #[test]
    fn parse_supported_date_formats() {
        assert_eq!(parse_transaction_date("2025-11-11"), Some(date(2025, 11, 11)));
        assert_eq!(parse_transaction_date("11.11.2025"), Some(date(2025, 11, 11)));
        assert_eq!(parse_transaction_date("11/11/2025"), Some(date(2025, 11, 11)));
        assert_eq!(
            parse_transaction_date("2025-11-11T10:15:00+04:00"),
            Some(date(2025, 11, 11))
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_transaction_date(""), None);
        assert_eq!(parse_transaction_date("yesterday"), None);
        assert_eq!(parse_transaction_date("2025-13-40"), None);
    }

    #[test]
    fn matching_text_prefers_translation() {
        let mut tx = RawTransactionCandidate::new("გადახდა - Nikora", Money::from_cents(-500), "2025-01-01");
        assert_eq!(tx.matching_text(), "გადახდა - Nikora");
        tx.translated_description = Some("Payment - Nikora".into());
        assert_eq!(tx.matching_text(), "Payment - Nikora");
        tx.translated_description = Some("   ".into());
        assert_eq!(tx.matching_text(), "გადახდა - Nikora");
    }

    #[test]
    fn explicit_category_clear_has_no_id() {
        assert_eq!(ExplicitCategory::Clear.category_id(), None);
        assert_eq!(ExplicitCategory::Assign(CategoryId(3)).category_id(), Some(CategoryId(3)));
    }

    #[test]
    fn candidate_deserializes_with_defaults() {
        let tx: RawTransactionCandidate = serde_json::from_str(
            r#"{"description":"STARBUCKS","amount":"-4.50","date":"2025-01-02"}"#,
        )
        .unwrap();
        assert_eq!(tx.amount, Money::from_cents(-450));
        assert!(tx.translated_description.is_none());
        assert!(tx.user_category.is_none());
    }
}
