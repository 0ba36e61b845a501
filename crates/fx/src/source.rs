//! Live exchange-rate sources.
//!
//! Two shapes exist: a date-indexed pair quote service ([`FrankfurterSource`])
//! and a central-bank daily archive quoting every currency against the rouble
//! ([`CbrDailyArchive`]). [`CrossRateSource`] turns the archive into a pair
//! quote by crossing through the reference currency.

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use tally_core::{FxConfig, StoreError};

#[derive(Debug, Error)]
pub enum FxError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid rate data: {0}")]
    InvalidData(String),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// A quote for one pair on one exact day.
#[async_trait]
pub trait RateSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Units of `quote` per unit of `base` on `date`, or `None` if the source
    /// has nothing for that pair and day.
    async fn fetch_rate(
        &self,
        base: &str,
        quote: &str,
        date: NaiveDate,
    ) -> Result<Option<Decimal>, FxError>;
}

/// Every currency's value in the reference currency, one calendar day at a time.
#[async_trait]
pub trait DailyArchive: Send + Sync {
    /// Reference-currency units per one unit of each listed currency, or `None`
    /// when nothing was published that day (weekends, holidays).
    async fn daily_values(&self, date: NaiveDate) -> Result<Option<HashMap<String, Decimal>>, FxError>;
}

/// Adapts a [`DailyArchive`] into a [`RateSource`] by crossing through the
/// reference currency, stepping back over days with no publication.
pub struct CrossRateSource<A> {
    archive: A,
    reference: String,
    max_steps: u32,
}

impl<A: DailyArchive> CrossRateSource<A> {
    pub fn new(archive: A, reference: &str, max_steps: u32) -> Self {
        Self {
            archive,
            reference: reference.to_uppercase(),
            max_steps,
        }
    }

    fn per_unit(&self, values: &HashMap<String, Decimal>, code: &str) -> Option<Decimal> {
        if code.eq_ignore_ascii_case(&self.reference) {
            Some(Decimal::ONE)
        } else {
            values.get(&code.to_uppercase()).copied()
        }
    }
}

#[async_trait]
impl<A: DailyArchive> RateSource for CrossRateSource<A> {
    fn name(&self) -> &'static str {
        "central-bank archive"
    }

    async fn fetch_rate(
        &self,
        base: &str,
        quote: &str,
        date: NaiveDate,
    ) -> Result<Option<Decimal>, FxError> {
        let mut day = date;
        for step in 0..=self.max_steps {
            if let Some(values) = self.archive.daily_values(day).await? {
                let rate = match (self.per_unit(&values, base), self.per_unit(&values, quote)) {
                    (Some(b), Some(q)) if !q.is_zero() => Some(b / q),
                    _ => None,
                };
                debug!(%base, %quote, %date, published = %day, step, found = rate.is_some(), "Archive lookup");
                return Ok(rate);
            }
            day -= Duration::days(1);
        }
        debug!(%base, %quote, %date, steps = self.max_steps, "No archive publication in range");
        Ok(None)
    }
}

fn http_client(config: &FxConfig) -> Result<Client, FxError> {
    Ok(Client::builder()
        .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
        .build()?)
}

/// Statuses that mean "no data for this request" rather than a failure.
fn is_no_data(status: StatusCode) -> bool {
    matches!(status, StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY)
}

#[derive(Debug, Deserialize)]
struct CbrDaily {
    #[serde(rename = "Valute", default)]
    valute: HashMap<String, CbrValute>,
}

#[derive(Debug, Deserialize)]
struct CbrValute {
    #[serde(rename = "Nominal")]
    nominal: Decimal,
    #[serde(rename = "Value")]
    value: Decimal,
}

/// Daily JSON archive of the Russian central bank's official rates.
pub struct CbrDailyArchive {
    http_client: Client,
    base_url: String,
}

impl CbrDailyArchive {
    pub fn new(config: &FxConfig) -> Result<Self, FxError> {
        Ok(Self {
            http_client: http_client(config)?,
            base_url: config.cbr_archive_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, date: NaiveDate) -> String {
        format!(
            "{}/{:04}/{:02}/{:02}/daily_json.js",
            self.base_url,
            date.year(),
            date.month(),
            date.day()
        )
    }
}

#[async_trait]
impl DailyArchive for CbrDailyArchive {
    async fn daily_values(&self, date: NaiveDate) -> Result<Option<HashMap<String, Decimal>>, FxError> {
        let response = self.http_client.get(self.url(date)).send().await?;
        if is_no_data(response.status()) {
            return Ok(None);
        }
        let daily: CbrDaily = response.error_for_status()?.json().await?;
        let values = daily
            .valute
            .into_iter()
            .filter(|(_, v)| !v.nominal.is_zero())
            .map(|(code, v)| (code.to_uppercase(), v.value / v.nominal))
            .collect();
        Ok(Some(values))
    }
}

#[derive(Debug, Deserialize)]
struct FrankfurterResponse {
    #[serde(default)]
    rates: HashMap<String, Decimal>,
}

/// Date-indexed ECB reference rates served by frankfurter.app.
pub struct FrankfurterSource {
    http_client: Client,
    base_url: String,
}

impl FrankfurterSource {
    pub fn new(config: &FxConfig) -> Result<Self, FxError> {
        Ok(Self {
            http_client: http_client(config)?,
            base_url: config.frankfurter_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RateSource for FrankfurterSource {
    fn name(&self) -> &'static str {
        "frankfurter"
    }

    async fn fetch_rate(
        &self,
        base: &str,
        quote: &str,
        date: NaiveDate,
    ) -> Result<Option<Decimal>, FxError> {
        let url = format!("{}/{}", self.base_url, date.format("%Y-%m-%d"));
        let response = self
            .http_client
            .get(url)
            .query(&[("from", base), ("to", quote)])
            .send()
            .await?;
        if is_no_data(response.status()) {
            return Ok(None);
        }
        let body: FrankfurterResponse = response.error_for_status()?.json().await?;
        Ok(body.rates.get(&quote.to_uppercase()).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Publishes only on the listed days.
    struct StubArchive {
        days: HashMap<NaiveDate, HashMap<String, Decimal>>,
        calls: AtomicUsize,
    }

    impl StubArchive {
        fn new(days: Vec<(NaiveDate, Vec<(&str, Decimal)>)>) -> Self {
            Self {
                days: days
                    .into_iter()
                    .map(|(d, vals)| (d, vals.into_iter().map(|(c, v)| (c.to_string(), v)).collect()))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DailyArchive for StubArchive {
        async fn daily_values(&self, date: NaiveDate) -> Result<Option<HashMap<String, Decimal>>, FxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.days.get(&date).cloned())
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[tokio::test]
    async fn crosses_through_reference() {
        let archive = StubArchive::new(vec![(
            day(10),
            vec![("USD", Decimal::new(90, 0)), ("EUR", Decimal::new(99, 0))],
        )]);
        let source = CrossRateSource::new(archive, "RUB", 14);

        let usd_rub = source.fetch_rate("USD", "RUB", day(10)).await.unwrap();
        assert_eq!(usd_rub, Some(Decimal::new(90, 0)));

        let rub_usd = source.fetch_rate("RUB", "USD", day(10)).await.unwrap().unwrap();
        assert_eq!(rub_usd, Decimal::ONE / Decimal::new(90, 0));

        let eur_usd = source.fetch_rate("eur", "usd", day(10)).await.unwrap().unwrap();
        assert_eq!(eur_usd, Decimal::new(11, 1));
    }

    #[tokio::test]
    async fn steps_back_over_unpublished_days() {
        let archive = StubArchive::new(vec![(day(7), vec![("USD", Decimal::new(88, 0))])]);
        let source = CrossRateSource::new(archive, "RUB", 14);
        let rate = source.fetch_rate("USD", "RUB", day(9)).await.unwrap();
        assert_eq!(rate, Some(Decimal::new(88, 0)));
        assert_eq!(source.archive.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn step_budget_is_bounded() {
        let archive = StubArchive::new(vec![(day(1), vec![("USD", Decimal::new(88, 0))])]);
        let source = CrossRateSource::new(archive, "RUB", 3);
        assert_eq!(source.fetch_rate("USD", "RUB", day(10)).await.unwrap(), None);
        assert_eq!(source.archive.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn unlisted_currency_has_no_rate() {
        let archive = StubArchive::new(vec![(day(10), vec![("USD", Decimal::new(90, 0))])]);
        let source = CrossRateSource::new(archive, "RUB", 14);
        assert_eq!(source.fetch_rate("GEL", "RUB", day(10)).await.unwrap(), None);
    }

    #[test]
    fn cbr_payload_parses() {
        let daily: CbrDaily = serde_json::from_str(
            r#"{"Date":"2025-03-07T11:30:00+03:00","Valute":{
                "USD":{"CharCode":"USD","Nominal":1,"Value":89.5},
                "KZT":{"CharCode":"KZT","Nominal":100,"Value":17.9}}}"#,
        )
        .unwrap();
        let kzt = &daily.valute["KZT"];
        assert_eq!(kzt.value / kzt.nominal, Decimal::new(179, 3));
    }

    #[test]
    fn archive_url_layout() {
        let archive = CbrDailyArchive::new(&FxConfig {
            cbr_archive_url: "https://example.test/archive/".into(),
            ..FxConfig::default()
        })
        .unwrap();
        assert_eq!(archive.url(day(7)), "https://example.test/archive/2025/03/07/daily_json.js");
    }
}
