use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyId(pub i64);

impl fmt::Display for CurrencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub id: CurrencyId,
    /// ISO 4217 code, uppercase.
    pub code: String,
    pub name: String,
}

impl Currency {
    pub fn new(id: i64, code: &str, name: &str) -> Self {
        Currency {
            id: CurrencyId(id),
            code: code.to_uppercase(),
            name: name.to_string(),
        }
    }
}

/// One stored quote: 1 unit of `base` = `rate` units of `quote` on `rate_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub base: CurrencyId,
    pub quote: CurrencyId,
    pub rate_date: NaiveDate,
    pub rate: Decimal,
}

/// Id ↔ ISO code lookup, built once from the currency table.
#[derive(Debug, Clone, Default)]
pub struct CurrencyCatalog {
    by_id: HashMap<CurrencyId, Currency>,
    by_code: HashMap<String, CurrencyId>,
}

impl CurrencyCatalog {
    pub fn new(currencies: Vec<Currency>) -> Self {
        let mut catalog = CurrencyCatalog::default();
        for currency in currencies {
            catalog.by_code.insert(currency.code.to_uppercase(), currency.id);
            catalog.by_id.insert(currency.id, currency);
        }
        catalog
    }

    pub fn code(&self, id: CurrencyId) -> Option<&str> {
        self.by_id.get(&id).map(|c| c.code.as_str())
    }

    pub fn id_for(&self, code: &str) -> Option<CurrencyId> {
        self.by_code.get(&code.trim().to_uppercase()).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Currency> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

pub const DEFAULT_CURRENCIES: &[(&str, &str)] = &[
    ("GEL", "Georgian Lari"),
    ("USD", "US Dollar"),
    ("EUR", "Euro"),
    ("GBP", "British Pound"),
    ("RUB", "Russian Ruble"),
    ("TRY", "Turkish Lira"),
    ("KZT", "Kazakhstani Tenge"),
    ("AMD", "Armenian Dram"),
    ("AZN", "Azerbaijani Manat"),
    ("BYN", "Belarusian Ruble"),
    ("UAH", "Ukrainian Hryvnia"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lookups() {
        let catalog = CurrencyCatalog::new(vec![
            Currency::new(1, "usd", "US Dollar"),
            Currency::new(2, "RUB", "Russian Ruble"),
        ]);
        assert_eq!(catalog.code(CurrencyId(1)), Some("USD"));
        assert_eq!(catalog.id_for("rub"), Some(CurrencyId(2)));
        assert_eq!(catalog.id_for("EUR"), None);
        assert_eq!(catalog.len(), 2);
    }
}
