use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tally_core::{DEFAULT_CATEGORIES, DEFAULT_CURRENCIES, DEFAULT_MERCHANTS};

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            category_type TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS currencies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // owner_id is 0 for global patterns so the unique key also covers them.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS merchant_patterns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scope TEXT NOT NULL,
            owner_id INTEGER NOT NULL DEFAULT 0,
            pattern TEXT NOT NULL,
            normalized TEXT NOT NULL,
            category_id INTEGER NOT NULL,
            match_count INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (scope, owner_id, normalized),
            FOREIGN KEY (category_id) REFERENCES categories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS exchange_rates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            base_currency_id INTEGER NOT NULL,
            quote_currency_id INTEGER NOT NULL,
            rate_date TEXT NOT NULL,
            rate TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (base_currency_id, quote_currency_id, rate_date),
            FOREIGN KEY (base_currency_id) REFERENCES currencies(id),
            FOREIGN KEY (quote_currency_id) REFERENCES currencies(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            transaction_type TEXT NOT NULL,
            amount TEXT NOT NULL,
            description TEXT NOT NULL,
            date TEXT NOT NULL,
            category_id INTEGER,
            currency_id INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (user_id, date, amount, description, currency_id),
            FOREIGN KEY (category_id) REFERENCES categories(id),
            FOREIGN KEY (currency_id) REFERENCES currencies(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_exchange_rates_pair_date ON exchange_rates (base_currency_id, quote_currency_id, rate_date DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Idempotent: existing rows are left alone.
pub async fn seed_defaults(pool: &DbPool) -> Result<(), sqlx::Error> {
    for (name, category_type) in DEFAULT_CATEGORIES {
        sqlx::query("INSERT OR IGNORE INTO categories (name, category_type) VALUES (?, ?)")
            .bind(name)
            .bind(category_type.to_string())
            .execute(pool)
            .await?;
    }

    for (code, name) in DEFAULT_CURRENCIES {
        sqlx::query("INSERT OR IGNORE INTO currencies (code, name) VALUES (?, ?)")
            .bind(code)
            .bind(name)
            .execute(pool)
            .await?;
    }

    for (pattern, category) in DEFAULT_MERCHANTS {
        sqlx::query(
            "INSERT OR IGNORE INTO merchant_patterns (scope, owner_id, pattern, normalized, category_id)
             SELECT 'global', 0, ?, ?, id FROM categories WHERE name = ?",
        )
        .bind(pattern)
        .bind(pattern)
        .bind(category)
        .execute(pool)
        .await?;
    }

    Ok(())
}
