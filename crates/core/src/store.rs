//! Storage seams consumed by the import and FX engines.
//!
//! `tally-storage` implements these over SQLite; tests use in-memory doubles.

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::category::{Category, CategoryId};
use crate::currency::{Currency, CurrencyId, ExchangeRate};
use crate::pattern::{MerchantPattern, PatternScope};
use crate::transaction::ResolvedTransaction;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

#[async_trait]
pub trait PatternStore: Send + Sync {
    async fn find_pattern(
        &self,
        scope: PatternScope,
        normalized: &str,
    ) -> Result<Option<MerchantPattern>, StoreError>;

    async fn list_patterns(&self, scope: PatternScope) -> Result<Vec<MerchantPattern>, StoreError>;

    /// Creates the pattern with a count of 1, or on conflict re-points it at
    /// `category_id` and increments its count.
    async fn upsert_pattern(
        &self,
        scope: PatternScope,
        pattern: &str,
        normalized: &str,
        category_id: CategoryId,
    ) -> Result<MerchantPattern, StoreError>;
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError>;

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError>;

    /// Case-insensitive exact name lookup.
    async fn find_category_by_name(&self, name: &str) -> Result<Option<Category>, StoreError>;
}

#[async_trait]
pub trait RateStore: Send + Sync {
    /// The most recent stored rate with `rate_date <= date`.
    async fn latest_rate_at(
        &self,
        base: CurrencyId,
        quote: CurrencyId,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>, StoreError>;

    /// The most recent stored rate for the pair, whatever its date.
    async fn latest_rate(
        &self,
        base: CurrencyId,
        quote: CurrencyId,
    ) -> Result<Option<ExchangeRate>, StoreError>;

    /// Insert or overwrite the row keyed by `(base, quote, rate_date)`.
    async fn upsert_rate(&self, rate: &ExchangeRate) -> Result<(), StoreError>;

    /// Every stored rate for any of `pairs`, newest first.
    async fn rates_for_pairs(
        &self,
        pairs: &[(CurrencyId, CurrencyId)],
    ) -> Result<Vec<ExchangeRate>, StoreError>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Inserts all rows, silently skipping duplicates. Returns how many were created.
    async fn insert_transactions(&self, rows: &[ResolvedTransaction]) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait CurrencyStore: Send + Sync {
    async fn list_currencies(&self) -> Result<Vec<Currency>, StoreError>;
}
