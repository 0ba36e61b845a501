use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use tally_core::{
    CurrencyCatalog, CurrencyStore, Money, RawTransactionCandidate, TallyConfig, UserId,
};
use tally_fx::{RateResolver, RefreshReport};
use tally_import::{learn_patterns, BatchImporter, Correction, ImportReport, LearnReport};
use tally_storage::SqliteStore;

#[derive(Debug, Serialize)]
pub struct ConvertOutput {
    pub amount: Decimal,
    pub from: String,
    pub to: String,
    pub date: NaiveDate,
    pub rate: Decimal,
    pub converted: Decimal,
}

async fn open_store(db_path: &Path) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    Ok(Arc::new(store))
}

async fn currency_catalog(store: &SqliteStore) -> Result<CurrencyCatalog> {
    Ok(CurrencyCatalog::new(store.list_currencies().await?))
}

fn read_json<T: serde::de::DeserializeOwned>(file: &Path) -> Result<T> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", file.display()))
}

pub async fn cmd_import(
    db_path: &Path,
    config: &TallyConfig,
    file: &Path,
    user: i64,
    currency: &str,
) -> Result<ImportReport> {
    let records: Vec<RawTransactionCandidate> = read_json(file)?;
    let store = open_store(db_path).await?;
    let catalog = currency_catalog(&store).await?;
    let Some(currency_id) = catalog.id_for(currency) else {
        bail!("Unknown currency '{currency}'");
    };

    let importer = BatchImporter::new(store.clone(), store.clone(), store)
        .with_matching(config.matching.clone());
    let report = importer
        .import(&records, UserId(user), Some(currency_id))
        .await?;
    tracing::info!(
        file = %file.display(),
        created = report.created,
        unmatched = report.outcome.unmatched_count,
        "Import finished"
    );
    Ok(report)
}

pub async fn cmd_learn(
    db_path: &Path,
    config: &TallyConfig,
    file: &Path,
    user: i64,
) -> Result<LearnReport> {
    let corrections: Vec<Correction> = read_json(file)?;
    let store = open_store(db_path).await?;
    let report = learn_patterns(
        store.clone(),
        store,
        corrections,
        UserId(user),
        config.matching.learn_batch_width,
    )
    .await;
    Ok(report)
}

pub async fn cmd_convert(
    db_path: &Path,
    config: &TallyConfig,
    amount: &str,
    from: &str,
    to: &str,
    date: Option<&str>,
) -> Result<ConvertOutput> {
    let amount = Decimal::from_str(amount.trim())
        .with_context(|| format!("Invalid amount '{amount}'"))?;
    let date = match date {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{raw}', expected YYYY-MM-DD"))?,
        None => Utc::now().date_naive(),
    };

    let store = open_store(db_path).await?;
    let catalog = currency_catalog(&store).await?;
    let (Some(base), Some(quote)) = (catalog.id_for(from), catalog.id_for(to)) else {
        bail!("Unknown currency pair {from}/{to}");
    };

    let resolver = RateResolver::from_config(store, catalog, config.fx.clone())?;
    let rate = resolver.get_rate(base, quote, date).await;
    let converted = Money::from_decimal(amount).convert(rate).round_dp(2);

    Ok(ConvertOutput {
        amount,
        from: from.to_uppercase(),
        to: to.to_uppercase(),
        date,
        rate,
        converted: converted.as_decimal(),
    })
}

pub async fn cmd_refresh_rates(db_path: &Path, config: &TallyConfig) -> Result<RefreshReport> {
    let store = open_store(db_path).await?;
    let catalog = currency_catalog(&store).await?;
    let resolver = RateResolver::from_config(store, catalog, config.fx.clone())?;
    let report = resolver.refresh_daily_rates().await;
    for error in &report.errors {
        tracing::warn!("Refresh: {error}");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{CategoryStore, PatternScope, PatternStore};

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn import_categorizes_and_skips_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("tally.db");
        let rows = write(
            dir.path(),
            "rows.json",
            r#"[
                {"description": "Vip Pay*YANDEX.GO", "amount": "-12.40", "date": "2025-03-07"},
                {"description": "Salary", "amount": "1500", "date": "07.03.2025"},
                {"description": "", "amount": "-1", "date": "2025-03-07"}
            ]"#,
        );
        let config = TallyConfig::default();

        let first = cmd_import(&db, &config, &rows, 1, "gel").await.unwrap();
        assert_eq!(first.created, 2);
        assert_eq!(first.outcome.dropped_count, 1);
        assert_eq!(first.outcome.matched_count, 1);

        let second = cmd_import(&db, &config, &rows, 1, "GEL").await.unwrap();
        assert_eq!(second.created, 0);
    }

    #[tokio::test]
    async fn unknown_explicit_category_keeps_rest_of_batch() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("tally.db");
        let rows = write(
            dir.path(),
            "rows.json",
            r#"[
                {"description": "Vip Pay*YANDEX.GO", "amount": "-12.40", "date": "2025-03-07"},
                {"description": "Corner shop", "amount": "-3", "date": "2025-03-07",
                 "user_category": {"assign": 9999}}
            ]"#,
        );

        let report = cmd_import(&db, &TallyConfig::default(), &rows, 1, "GEL").await.unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.outcome.persistable[1].category_id, None);
    }

    #[tokio::test]
    async fn import_rejects_unknown_currency() {
        let dir = tempfile::tempdir().unwrap();
        let rows = write(dir.path(), "rows.json", "[]");
        let err = cmd_import(&dir.path().join("t.db"), &TallyConfig::default(), &rows, 1, "XXX")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown currency"));
    }

    #[tokio::test]
    async fn learn_stores_user_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("tally.db");
        let store = SqliteStore::open(&db).await.unwrap();
        let groceries = store.find_category_by_name("Groceries").await.unwrap().unwrap();
        let corrections = write(
            dir.path(),
            "fix.json",
            &format!(
                r#"[{{"description": "POS CARREFOUR TBILISI", "category_id": {}}},
                    {{"description": "x", "category_id": {}}}]"#,
                groceries.id.0, groceries.id.0
            ),
        );

        let report = cmd_learn(&db, &TallyConfig::default(), &corrections, 9).await.unwrap();
        assert_eq!(report.learned, 1);
        assert_eq!(report.skipped, 1);

        let learned = store
            .list_patterns(PatternScope::User(UserId(9)))
            .await
            .unwrap();
        assert_eq!(learned.len(), 1);
        assert_eq!(learned[0].category_id, groceries.id);
    }

    #[tokio::test]
    async fn convert_same_currency_is_identity() {
        let dir = tempfile::tempdir().unwrap();
        let out = cmd_convert(
            &dir.path().join("tally.db"),
            &TallyConfig::default(),
            "10.005",
            "usd",
            "USD",
            Some("2025-03-07"),
        )
        .await
        .unwrap();
        assert_eq!(out.rate, Decimal::ONE);
        assert_eq!(out.converted, Decimal::new(1000, 2));
        assert_eq!(out.from, "USD");
    }

    #[tokio::test]
    async fn convert_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("tally.db");
        let config = TallyConfig::default();
        assert!(cmd_convert(&db, &config, "ten", "USD", "EUR", None).await.is_err());
        assert!(cmd_convert(&db, &config, "10", "USD", "EUR", Some("07/03/2025"))
            .await
            .is_err());
        assert!(cmd_convert(&db, &config, "10", "USD", "ZZZ", None).await.is_err());
    }
}
