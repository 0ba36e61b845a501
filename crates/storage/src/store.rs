//! SQLite implementations of the `tally-core` store traits.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use tally_core::category::canonical_category_name;
use tally_core::{
    Category, CategoryId, CategoryStore, CategoryType, Currency, CurrencyId, CurrencyStore,
    ExchangeRate, MerchantPattern, PatternScope, PatternStore, RateStore, ResolvedTransaction,
    StoreError, TransactionStore, UserId,
};

use crate::db::{create_db, seed_defaults, DbPool};

type PatternRow = (i64, String, i64, String, String, i64, i64);
type RateRow = (i64, i64, NaiveDate, String);

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn scope_key(scope: PatternScope) -> (&'static str, i64) {
    match scope {
        PatternScope::User(UserId(id)) => ("user", id),
        PatternScope::Global => ("global", 0),
    }
}

fn pattern_from_row(r: PatternRow) -> MerchantPattern {
    let scope = match r.1.as_str() {
        "user" => PatternScope::User(UserId(r.2)),
        _ => PatternScope::Global,
    };
    MerchantPattern {
        id: Some(r.0),
        scope,
        pattern: r.3,
        normalized: r.4,
        category_id: CategoryId(r.5),
        match_count: r.6,
    }
}

fn rate_from_row(r: RateRow) -> Result<ExchangeRate, StoreError> {
    let rate = Decimal::from_str(&r.3)
        .map_err(|e| StoreError::InvalidData(format!("bad rate '{}': {e}", r.3)))?;
    Ok(ExchangeRate {
        base: CurrencyId(r.0),
        quote: CurrencyId(r.1),
        rate_date: r.2,
        rate,
    })
}

fn category_from_row(r: (i64, String, String)) -> Category {
    Category {
        id: CategoryId(r.0),
        name: r.1,
        category_type: CategoryType::from_str(&r.2).unwrap_or(CategoryType::Either),
    }
}

/// Every store trait over one SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Creates or opens the database at `path`, migrates it and seeds defaults.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let pool = create_db(path).await.map_err(db_err)?;
        seed_defaults(&pool).await.map_err(db_err)?;
        debug!(path = %path.display(), "Opened database");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

const PATTERN_COLUMNS: &str =
    "id, scope, owner_id, pattern, normalized, category_id, match_count";

#[async_trait]
impl PatternStore for SqliteStore {
    async fn find_pattern(
        &self,
        scope: PatternScope,
        normalized: &str,
    ) -> Result<Option<MerchantPattern>, StoreError> {
        let (kind, owner) = scope_key(scope);
        let row = sqlx::query_as::<_, PatternRow>(&format!(
            "SELECT {PATTERN_COLUMNS} FROM merchant_patterns WHERE scope = ? AND owner_id = ? AND normalized = ?"
        ))
        .bind(kind)
        .bind(owner)
        .bind(normalized)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(pattern_from_row))
    }

    async fn list_patterns(&self, scope: PatternScope) -> Result<Vec<MerchantPattern>, StoreError> {
        let (kind, owner) = scope_key(scope);
        let rows = sqlx::query_as::<_, PatternRow>(&format!(
            "SELECT {PATTERN_COLUMNS} FROM merchant_patterns WHERE scope = ? AND owner_id = ? ORDER BY match_count DESC, id"
        ))
        .bind(kind)
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(pattern_from_row).collect())
    }

    async fn upsert_pattern(
        &self,
        scope: PatternScope,
        pattern: &str,
        normalized: &str,
        category_id: CategoryId,
    ) -> Result<MerchantPattern, StoreError> {
        let (kind, owner) = scope_key(scope);
        let row = sqlx::query_as::<_, PatternRow>(&format!(
            "INSERT INTO merchant_patterns (scope, owner_id, pattern, normalized, category_id, match_count)
             VALUES (?, ?, ?, ?, ?, 1)
             ON CONFLICT (scope, owner_id, normalized) DO UPDATE SET
                 category_id = excluded.category_id,
                 match_count = merchant_patterns.match_count + 1,
                 updated_at = datetime('now')
             RETURNING {PATTERN_COLUMNS}"
        ))
        .bind(kind)
        .bind(owner)
        .bind(pattern)
        .bind(normalized)
        .bind(category_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(pattern_from_row(row))
    }
}

#[async_trait]
impl CategoryStore for SqliteStore {
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT id, name, category_type FROM categories ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(category_from_row).collect())
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        let row = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT id, name, category_type FROM categories WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(category_from_row))
    }

    async fn find_category_by_name(&self, name: &str) -> Result<Option<Category>, StoreError> {
        let row = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT id, name, category_type FROM categories WHERE name = ? COLLATE NOCASE",
        )
        .bind(canonical_category_name(name))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(category_from_row))
    }
}

#[async_trait]
impl RateStore for SqliteStore {
    async fn latest_rate_at(
        &self,
        base: CurrencyId,
        quote: CurrencyId,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>, StoreError> {
        let row = sqlx::query_as::<_, RateRow>(
            "SELECT base_currency_id, quote_currency_id, rate_date, rate FROM exchange_rates
             WHERE base_currency_id = ? AND quote_currency_id = ? AND rate_date <= ?
             ORDER BY rate_date DESC LIMIT 1",
        )
        .bind(base.0)
        .bind(quote.0)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(rate_from_row).transpose()
    }

    async fn latest_rate(
        &self,
        base: CurrencyId,
        quote: CurrencyId,
    ) -> Result<Option<ExchangeRate>, StoreError> {
        let row = sqlx::query_as::<_, RateRow>(
            "SELECT base_currency_id, quote_currency_id, rate_date, rate FROM exchange_rates
             WHERE base_currency_id = ? AND quote_currency_id = ?
             ORDER BY rate_date DESC LIMIT 1",
        )
        .bind(base.0)
        .bind(quote.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(rate_from_row).transpose()
    }

    async fn upsert_rate(&self, rate: &ExchangeRate) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO exchange_rates (base_currency_id, quote_currency_id, rate_date, rate)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (base_currency_id, quote_currency_id, rate_date) DO UPDATE SET
                 rate = excluded.rate,
                 updated_at = datetime('now')",
        )
        .bind(rate.base.0)
        .bind(rate.quote.0)
        .bind(rate.rate_date)
        .bind(rate.rate.normalize().to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn rates_for_pairs(
        &self,
        pairs: &[(CurrencyId, CurrencyId)],
    ) -> Result<Vec<ExchangeRate>, StoreError> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let clauses = vec!["(base_currency_id = ? AND quote_currency_id = ?)"; pairs.len()].join(" OR ");
        let sql = format!(
            "SELECT base_currency_id, quote_currency_id, rate_date, rate FROM exchange_rates
             WHERE {clauses} ORDER BY rate_date DESC"
        );
        let mut query = sqlx::query_as::<_, RateRow>(&sql);
        for (base, quote) in pairs {
            query = query.bind(base.0).bind(quote.0);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;
        rows.into_iter().map(rate_from_row).collect()
    }
}

#[async_trait]
impl TransactionStore for SqliteStore {
    async fn insert_transactions(&self, rows: &[ResolvedTransaction]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut created = 0;
        for row in rows {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO transactions
                 (user_id, transaction_type, amount, description, date, category_id, currency_id)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(row.user_id.0)
            .bind(row.transaction_type.to_string())
            .bind(row.amount.as_decimal().normalize().to_string())
            .bind(&row.description)
            .bind(row.date)
            .bind(row.category_id.map(|c| c.0))
            .bind(row.currency_id.0)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            created += result.rows_affected() as usize;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(created)
    }
}

#[async_trait]
impl CurrencyStore for SqliteStore {
    async fn list_currencies(&self) -> Result<Vec<Currency>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT id, code, name FROM currencies ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(|r| Currency::new(r.0, &r.1, &r.2))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{Money, TransactionType, DEFAULT_CATEGORIES, DEFAULT_CURRENCIES, DEFAULT_MERCHANTS};
    use tempfile::TempDir;

    async fn open() -> (TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("tally.db")).await.unwrap();
        (dir, store)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[tokio::test]
    async fn seeds_are_idempotent() {
        let (dir, store) = open().await;
        seed_defaults(store.pool()).await.unwrap();
        assert_eq!(store.list_categories().await.unwrap().len(), DEFAULT_CATEGORIES.len());
        assert_eq!(store.list_currencies().await.unwrap().len(), DEFAULT_CURRENCIES.len());
        assert_eq!(
            store.list_patterns(PatternScope::Global).await.unwrap().len(),
            DEFAULT_MERCHANTS.len()
        );

        drop(store);
        let reopened = SqliteStore::open(&dir.path().join("tally.db")).await.unwrap();
        assert_eq!(reopened.list_categories().await.unwrap().len(), DEFAULT_CATEGORIES.len());
    }

    #[tokio::test]
    async fn category_lookup_is_alias_aware() {
        let (_dir, store) = open().await;
        let groceries = store.find_category_by_name("grocery").await.unwrap().unwrap();
        assert_eq!(groceries.name, "Groceries");
        assert_eq!(groceries.category_type, CategoryType::Expense);
        let by_id = store.get_category(groceries.id).await.unwrap().unwrap();
        assert_eq!(by_id, groceries);
        assert!(store.find_category_by_name("nonsense").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pattern_upsert_increments_per_scope() {
        let (_dir, store) = open().await;
        let groceries = store.find_category_by_name("groceries").await.unwrap().unwrap();
        let restaurants = store.find_category_by_name("restaurants").await.unwrap().unwrap();
        let alice = PatternScope::User(UserId(1));
        let bob = PatternScope::User(UserId(2));

        let p = store.upsert_pattern(alice, "Nikora", "nikora", groceries.id).await.unwrap();
        assert_eq!(p.match_count, 1);
        assert_eq!(p.scope, alice);

        let p = store.upsert_pattern(alice, "NIKORA", "nikora", restaurants.id).await.unwrap();
        assert_eq!(p.match_count, 2);
        assert_eq!(p.category_id, restaurants.id);

        store.upsert_pattern(bob, "Nikora", "nikora", groceries.id).await.unwrap();
        assert_eq!(store.list_patterns(alice).await.unwrap().len(), 1);
        assert_eq!(store.list_patterns(bob).await.unwrap().len(), 1);
        let found = store.find_pattern(bob, "nikora").await.unwrap().unwrap();
        assert_eq!(found.match_count, 1);
    }

    #[tokio::test]
    async fn rate_upsert_overwrites_and_queries_by_date() {
        let (_dir, store) = open().await;
        let (usd, gel) = (CurrencyId(2), CurrencyId(1));
        let rate = |d, r| ExchangeRate { base: usd, quote: gel, rate_date: day(d), rate: Decimal::new(r, 2) };

        store.upsert_rate(&rate(1, 270)).await.unwrap();
        store.upsert_rate(&rate(1, 271)).await.unwrap();
        store.upsert_rate(&rate(10, 275)).await.unwrap();

        let at = store.latest_rate_at(usd, gel, day(5)).await.unwrap().unwrap();
        assert_eq!(at.rate, Decimal::new(271, 2));
        assert_eq!(at.rate_date, day(1));
        assert!(store.latest_rate_at(gel, usd, day(5)).await.unwrap().is_none());
        assert_eq!(store.latest_rate(usd, gel).await.unwrap().unwrap().rate_date, day(10));

        store
            .upsert_rate(&ExchangeRate { base: gel, quote: usd, rate_date: day(3), rate: Decimal::new(37, 2) })
            .await
            .unwrap();
        let all = store.rates_for_pairs(&[(usd, gel), (gel, usd)]).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].rate_date, day(10));
        assert!(store.rates_for_pairs(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_transactions_are_ignored() {
        let (_dir, store) = open().await;
        let row = ResolvedTransaction {
            user_id: UserId(1),
            transaction_type: TransactionType::Expense,
            amount: Money::from_cents(450),
            description: "STARBUCKS #4521".into(),
            date: day(2),
            category_id: None,
            currency_id: CurrencyId(1),
        };
        let mut other = row.clone();
        other.amount = Money::from_cents(500);

        assert_eq!(store.insert_transactions(&[row.clone(), other]).await.unwrap(), 2);
        assert_eq!(store.insert_transactions(&[row]).await.unwrap(), 0);
    }
}
