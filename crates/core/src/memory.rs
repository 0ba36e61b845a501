//! In-memory implementation of every store trait, for tests and dry runs.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::category::{canonical_category_name, Category, CategoryId, DEFAULT_CATEGORIES};
use crate::currency::{Currency, CurrencyId, ExchangeRate, DEFAULT_CURRENCIES};
use crate::pattern::{MerchantPattern, PatternScope, DEFAULT_MERCHANTS};
use crate::store::{
    CategoryStore, CurrencyStore, PatternStore, RateStore, StoreError, TransactionStore,
};
use crate::transaction::ResolvedTransaction;

#[derive(Debug, Default)]
struct MemoryData {
    categories: Vec<Category>,
    currencies: Vec<Currency>,
    patterns: Vec<MerchantPattern>,
    rates: HashMap<(CurrencyId, CurrencyId, NaiveDate), Decimal>,
    transactions: Vec<ResolvedTransaction>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<MemoryData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeded the same way a fresh database is: default categories, currencies
    /// and global merchant patterns, ids assigned from 1 in table order.
    pub fn with_defaults() -> Self {
        let categories: Vec<Category> = DEFAULT_CATEGORIES
            .iter()
            .enumerate()
            .map(|(i, (name, kind))| Category::new(i as i64 + 1, name, *kind))
            .collect();
        let currencies = DEFAULT_CURRENCIES
            .iter()
            .enumerate()
            .map(|(i, (code, name))| Currency::new(i as i64 + 1, code, name))
            .collect();
        let patterns = DEFAULT_MERCHANTS
            .iter()
            .enumerate()
            .filter_map(|(i, (pattern, category))| {
                let category = categories.iter().find(|c| c.name == *category)?;
                let mut p = MerchantPattern::new(PatternScope::Global, pattern, pattern, category.id);
                p.id = Some(i as i64 + 1);
                Some(p)
            })
            .collect();

        Self {
            data: Arc::new(RwLock::new(MemoryData {
                categories,
                currencies,
                patterns,
                ..Default::default()
            })),
        }
    }

    pub fn with_categories(self, categories: Vec<Category>) -> Self {
        if let Ok(mut data) = self.data.write() {
            data.categories = categories;
        }
        self
    }

    pub fn with_currencies(self, currencies: Vec<Currency>) -> Self {
        if let Ok(mut data) = self.data.write() {
            data.currencies = currencies;
        }
        self
    }

    pub fn with_rate(self, rate: ExchangeRate) -> Self {
        if let Ok(mut data) = self.data.write() {
            data.rates
                .insert((rate.base, rate.quote, rate.rate_date), rate.rate);
        }
        self
    }

    /// Snapshot of every persisted transaction.
    pub fn transactions(&self) -> Vec<ResolvedTransaction> {
        self.data
            .read()
            .map(|d| d.transactions.clone())
            .unwrap_or_default()
    }

    pub fn rate_count(&self) -> usize {
        self.data.read().map(|d| d.rates.len()).unwrap_or_default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryData>, StoreError> {
        self.data
            .read()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryData>, StoreError> {
        self.data
            .write()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }
}

fn to_rate(key: &(CurrencyId, CurrencyId, NaiveDate), rate: Decimal) -> ExchangeRate {
    ExchangeRate {
        base: key.0,
        quote: key.1,
        rate_date: key.2,
        rate,
    }
}

#[async_trait]
impl PatternStore for MemoryStore {
    async fn find_pattern(
        &self,
        scope: PatternScope,
        normalized: &str,
    ) -> Result<Option<MerchantPattern>, StoreError> {
        Ok(self
            .read()?
            .patterns
            .iter()
            .find(|p| p.scope == scope && p.normalized == normalized)
            .cloned())
    }

    async fn list_patterns(&self, scope: PatternScope) -> Result<Vec<MerchantPattern>, StoreError> {
        Ok(self
            .read()?
            .patterns
            .iter()
            .filter(|p| p.scope == scope)
            .cloned()
            .collect())
    }

    async fn upsert_pattern(
        &self,
        scope: PatternScope,
        pattern: &str,
        normalized: &str,
        category_id: CategoryId,
    ) -> Result<MerchantPattern, StoreError> {
        let mut data = self.write()?;
        if let Some(existing) = data
            .patterns
            .iter_mut()
            .find(|p| p.scope == scope && p.normalized == normalized)
        {
            existing.category_id = category_id;
            existing.match_count += 1;
            return Ok(existing.clone());
        }
        let mut created = MerchantPattern::new(scope, pattern, normalized, category_id);
        created.id = Some(data.patterns.len() as i64 + 1);
        data.patterns.push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl CategoryStore for MemoryStore {
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        Ok(self.read()?.categories.clone())
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        Ok(self.read()?.categories.iter().find(|c| c.id == id).cloned())
    }

    async fn find_category_by_name(&self, name: &str) -> Result<Option<Category>, StoreError> {
        let wanted = canonical_category_name(name);
        Ok(self
            .read()?
            .categories
            .iter()
            .find(|c| c.name.to_lowercase() == wanted)
            .cloned())
    }
}

#[async_trait]
impl RateStore for MemoryStore {
    async fn latest_rate_at(
        &self,
        base: CurrencyId,
        quote: CurrencyId,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>, StoreError> {
        Ok(self
            .read()?
            .rates
            .iter()
            .filter(|(k, _)| k.0 == base && k.1 == quote && k.2 <= date)
            .max_by_key(|(k, _)| k.2)
            .map(|(k, r)| to_rate(k, *r)))
    }

    async fn latest_rate(
        &self,
        base: CurrencyId,
        quote: CurrencyId,
    ) -> Result<Option<ExchangeRate>, StoreError> {
        Ok(self
            .read()?
            .rates
            .iter()
            .filter(|(k, _)| k.0 == base && k.1 == quote)
            .max_by_key(|(k, _)| k.2)
            .map(|(k, r)| to_rate(k, *r)))
    }

    async fn upsert_rate(&self, rate: &ExchangeRate) -> Result<(), StoreError> {
        self.write()?
            .rates
            .insert((rate.base, rate.quote, rate.rate_date), rate.rate);
        Ok(())
    }

    async fn rates_for_pairs(
        &self,
        pairs: &[(CurrencyId, CurrencyId)],
    ) -> Result<Vec<ExchangeRate>, StoreError> {
        let mut rates: Vec<ExchangeRate> = self
            .read()?
            .rates
            .iter()
            .filter(|(k, _)| pairs.contains(&(k.0, k.1)))
            .map(|(k, r)| to_rate(k, *r))
            .collect();
        rates.sort_by(|a, b| b.rate_date.cmp(&a.rate_date));
        Ok(rates)
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn insert_transactions(&self, rows: &[ResolvedTransaction]) -> Result<usize, StoreError> {
        let mut data = self.write()?;
        let mut created = 0;
        for row in rows {
            let duplicate = data.transactions.iter().any(|t| {
                t.user_id == row.user_id
                    && t.date == row.date
                    && t.amount == row.amount
                    && t.description == row.description
                    && t.currency_id == row.currency_id
            });
            if !duplicate {
                data.transactions.push(row.clone());
                created += 1;
            }
        }
        Ok(created)
    }
}

#[async_trait]
impl CurrencyStore for MemoryStore {
    async fn list_currencies(&self) -> Result<Vec<Currency>, StoreError> {
        Ok(self.read()?.currencies.clone())
    }
}
