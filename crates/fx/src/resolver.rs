//! Historical exchange-rate resolution.
//!
//! `get_rate` walks a fixed fallback chain and never fails:
//!
//! 1. identity pair → 1
//! 2. in-process memo
//! 3. stored rate at or before the date, if younger than `max_rate_age_days`
//! 4. live fetch (past and current dates only), persisted on success
//! 5. stored reversed pair, inverted
//! 6. latest stored rate of any age, direct then reversed
//! 7. 1 with a warning
//!
//! Steps 2 to 7 run once per `(base, quote, day)` no matter how many callers ask
//! concurrently.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use tally_core::{CurrencyCatalog, CurrencyId, ExchangeRate, FxConfig, Money, RateStore};

use crate::cache::{RateCache, RateKey};
use crate::single_flight::SingleFlight;
use crate::source::{CbrDailyArchive, CrossRateSource, FrankfurterSource, FxError, RateSource};

/// Source of "today", so future dates are never fetched live.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// One amount to convert: `(amount, its currency, the day it applies to)`.
pub type ConversionItem = (Money, CurrencyId, NaiveDate);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

fn invert(rate: Decimal) -> Option<Decimal> {
    (!rate.is_zero()).then(|| Decimal::ONE / rate)
}

pub struct RateResolver {
    store: Arc<dyn RateStore>,
    currencies: CurrencyCatalog,
    /// Date-indexed pair quotes.
    market: Arc<dyn RateSource>,
    /// Central-bank archive, crossed through the reference currency.
    archive: Arc<dyn RateSource>,
    cache: RateCache,
    flights: SingleFlight<RateKey, Decimal>,
    clock: Arc<dyn Clock>,
    config: FxConfig,
}

impl RateResolver {
    pub fn new(
        store: Arc<dyn RateStore>,
        currencies: CurrencyCatalog,
        market: Arc<dyn RateSource>,
        archive: Arc<dyn RateSource>,
        config: FxConfig,
    ) -> Self {
        Self {
            store,
            currencies,
            market,
            archive,
            cache: RateCache::new(),
            flights: SingleFlight::new(),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Wires the HTTP sources described by `config`.
    pub fn from_config(
        store: Arc<dyn RateStore>,
        currencies: CurrencyCatalog,
        config: FxConfig,
    ) -> Result<Self, FxError> {
        let market = Arc::new(FrankfurterSource::new(&config)?);
        let archive = Arc::new(CrossRateSource::new(
            CbrDailyArchive::new(&config)?,
            &config.reference_currency,
            config.archive_max_steps,
        ));
        Ok(Self::new(store, currencies, market, archive, config))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn currencies(&self) -> &CurrencyCatalog {
        &self.currencies
    }

    /// Units of `quote` per unit of `base` on `date`. Never fails.
    pub async fn get_rate(&self, base: CurrencyId, quote: CurrencyId, date: NaiveDate) -> Decimal {
        if base == quote {
            return Decimal::ONE;
        }
        let key = (base, quote, date);
        if let Some(rate) = self.cache.get(&key) {
            return rate;
        }
        self.flights
            .run(key, || self.resolve(base, quote, date))
            .await
    }

    /// Identity conversions return `amount` untouched.
    pub async fn convert(
        &self,
        amount: Money,
        base: CurrencyId,
        quote: CurrencyId,
        date: NaiveDate,
    ) -> Money {
        if base == quote {
            return amount;
        }
        amount.convert(self.get_rate(base, quote, date).await)
    }

    /// Converts every item into `target`, at most `conversion_concurrency`
    /// lookups in flight. Output order matches input order.
    pub async fn convert_many(self: &Arc<Self>, items: &[ConversionItem], target: CurrencyId) -> Vec<Money> {
        let window = self.config.conversion_concurrency.max(1);
        let mut results = vec![Money::zero(); items.len()];
        let mut set = JoinSet::new();

        for (idx, &(amount, currency, date)) in items.iter().enumerate() {
            if set.len() >= window {
                if let Some(joined) = set.join_next().await {
                    Self::place(&mut results, joined);
                }
            }
            let resolver = Arc::clone(self);
            set.spawn(async move { (idx, resolver.convert(amount, currency, target, date).await) });
        }
        while let Some(joined) = set.join_next().await {
            Self::place(&mut results, joined);
        }
        results
    }

    fn place(results: &mut [Money], joined: Result<(usize, Money), tokio::task::JoinError>) {
        match joined {
            Ok((idx, money)) => results[idx] = money,
            Err(e) => warn!("Conversion task failed: {e}"),
        }
    }

    /// Resolves a rate into `target` for every distinct `(currency, date)` in
    /// `entries` using a single store query. A rate at or before the date wins,
    /// then the latest stored rate of any date; identity and unknown pairs map to 1.
    pub async fn preload_rates(
        &self,
        entries: &[(CurrencyId, NaiveDate)],
        target: CurrencyId,
    ) -> Result<HashMap<(CurrencyId, NaiveDate), Decimal>, FxError> {
        let keys: BTreeSet<(CurrencyId, NaiveDate)> = entries.iter().copied().collect();
        let currencies: BTreeSet<CurrencyId> = keys
            .iter()
            .map(|(c, _)| *c)
            .filter(|c| *c != target)
            .collect();
        let pairs: Vec<(CurrencyId, CurrencyId)> = currencies
            .iter()
            .flat_map(|&c| [(c, target), (target, c)])
            .collect();

        let stored = if pairs.is_empty() {
            Vec::new()
        } else {
            self.store.rates_for_pairs(&pairs).await?
        };
        let mut by_pair: HashMap<(CurrencyId, CurrencyId), Vec<&ExchangeRate>> = HashMap::new();
        for rate in &stored {
            by_pair.entry((rate.base, rate.quote)).or_default().push(rate);
        }
        for rates in by_pair.values_mut() {
            rates.sort_by(|a, b| b.rate_date.cmp(&a.rate_date));
        }
        let at_or_before = |base: CurrencyId, quote: CurrencyId, date: NaiveDate| {
            by_pair
                .get(&(base, quote))
                .and_then(|rates| rates.iter().find(|r| r.rate_date <= date))
                .map(|r| r.rate)
        };
        let latest = |base: CurrencyId, quote: CurrencyId| {
            by_pair.get(&(base, quote)).and_then(|rates| rates.first()).map(|r| r.rate)
        };

        let mut resolved = HashMap::with_capacity(keys.len());
        for (currency, date) in keys {
            let rate = if currency == target {
                Decimal::ONE
            } else {
                at_or_before(currency, target, date)
                    .or_else(|| at_or_before(target, currency, date).and_then(invert))
                    .or_else(|| latest(currency, target))
                    .or_else(|| latest(target, currency).and_then(invert))
                    .unwrap_or(Decimal::ONE)
            };
            resolved.insert((currency, date), rate);
        }
        debug!(keys = resolved.len(), stored = stored.len(), "Preloaded rates");
        Ok(resolved)
    }

    /// Converts with rates from [`preload_rates`](Self::preload_rates); no I/O.
    pub fn convert_with_rates(
        items: &[ConversionItem],
        target: CurrencyId,
        rates: &HashMap<(CurrencyId, NaiveDate), Decimal>,
    ) -> Vec<Money> {
        items
            .iter()
            .map(|&(amount, currency, date)| {
                if currency == target {
                    amount
                } else {
                    let rate = rates.get(&(currency, date)).copied().unwrap_or(Decimal::ONE);
                    amount.convert(rate)
                }
            })
            .collect()
    }

    /// Fetches today's rate from the refresh base currency to every other
    /// known currency, skipping pairs already stored for today.
    pub async fn refresh_daily_rates(&self) -> RefreshReport {
        let mut report = RefreshReport::default();
        let today = self.clock.today();
        let Some(base) = self.currencies.id_for(&self.config.refresh_base_currency) else {
            report.errors.push(format!(
                "unknown base currency '{}'",
                self.config.refresh_base_currency
            ));
            return report;
        };
        let base_code = self.config.refresh_base_currency.to_uppercase();

        let quotes: Vec<(CurrencyId, String)> = self
            .currencies
            .iter()
            .filter(|c| c.id != base)
            .map(|c| (c.id, c.code.clone()))
            .collect();

        for (quote, quote_code) in quotes {
            match self.store.latest_rate_at(base, quote, today).await {
                Ok(Some(existing)) if existing.rate_date == today => {
                    report.skipped += 1;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    report.errors.push(format!("{base_code}/{quote_code}: {e}"));
                    continue;
                }
            }
            match self.fetch_live(base, quote, &base_code, &quote_code, today).await {
                Some(_) => report.updated += 1,
                None => report
                    .errors
                    .push(format!("{base_code}/{quote_code}: no source had a rate")),
            }
        }

        info!(
            updated = report.updated,
            skipped = report.skipped,
            errors = report.errors.len(),
            "Daily rate refresh finished"
        );
        report
    }

    async fn resolve(&self, base: CurrencyId, quote: CurrencyId, date: NaiveDate) -> Decimal {
        let key = (base, quote, date);
        let max_age = self.config.max_rate_age_days;

        let stored = self.stored_at(base, quote, date).await;
        if let Some(rate) = stored.as_ref().filter(|r| (date - r.rate_date).num_days() < max_age) {
            self.cache.insert(key, rate.rate);
            return rate.rate;
        }

        if date <= self.clock.today() {
            match (self.currencies.code(base), self.currencies.code(quote)) {
                (Some(base_code), Some(quote_code)) => {
                    let (base_code, quote_code) = (base_code.to_string(), quote_code.to_string());
                    if let Some(rate) = self.fetch_live(base, quote, &base_code, &quote_code, date).await {
                        return rate;
                    }
                }
                _ => warn!(%base, %quote, "Currency missing from catalog, skipping live fetch"),
            }
        } else {
            debug!(%base, %quote, %date, "Future date, skipping live fetch");
        }

        if let Some(reversed) = self.stored_at(quote, base, date).await {
            if (date - reversed.rate_date).num_days() < max_age {
                if let Some(rate) = invert(reversed.rate) {
                    self.cache.insert(key, rate);
                    return rate;
                }
            }
        }

        // Stale from here on: returned but never memoized.
        if let Some(rate) = self.stored_latest(base, quote).await {
            warn!(%base, %quote, %date, rate_date = %rate.rate_date, "Using latest available rate");
            return rate.rate;
        }
        if let Some(rate) = self
            .stored_latest(quote, base)
            .await
            .and_then(|r| invert(r.rate))
        {
            warn!(%base, %quote, %date, "Using latest available reversed rate");
            return rate;
        }

        warn!(%base, %quote, %date, "No exchange rate available, falling back to 1.0");
        Decimal::ONE
    }

    /// Tries the preferred source, then the other. Persists and memoizes a hit.
    async fn fetch_live(
        &self,
        base: CurrencyId,
        quote: CurrencyId,
        base_code: &str,
        quote_code: &str,
        date: NaiveDate,
    ) -> Option<Decimal> {
        let sources: [&Arc<dyn RateSource>; 2] =
            if self.config.is_cis(base_code) || self.config.is_cis(quote_code) {
                [&self.archive, &self.market]
            } else {
                [&self.market, &self.archive]
            };

        for source in sources {
            match source.fetch_rate(base_code, quote_code, date).await {
                Ok(Some(rate)) if rate > Decimal::ZERO => {
                    let record = ExchangeRate {
                        base,
                        quote,
                        rate_date: date,
                        rate,
                    };
                    if let Err(e) = self.store.upsert_rate(&record).await {
                        warn!(%base_code, %quote_code, %date, "Failed to persist rate: {e}");
                    }
                    self.cache.insert((base, quote, date), rate);
                    info!(%base_code, %quote_code, %date, %rate, source = source.name(), "Fetched exchange rate");
                    return Some(rate);
                }
                Ok(_) => {
                    debug!(%base_code, %quote_code, %date, source = source.name(), "Source has no rate");
                }
                Err(e) => {
                    warn!(%base_code, %quote_code, %date, source = source.name(), "Rate fetch failed: {e}");
                }
            }
        }
        None
    }

    async fn stored_at(&self, base: CurrencyId, quote: CurrencyId, date: NaiveDate) -> Option<ExchangeRate> {
        self.store
            .latest_rate_at(base, quote, date)
            .await
            .unwrap_or_else(|e| {
                warn!(%base, %quote, "Rate store lookup failed: {e}");
                None
            })
    }

    async fn stored_latest(&self, base: CurrencyId, quote: CurrencyId) -> Option<ExchangeRate> {
        self.store.latest_rate(base, quote).await.unwrap_or_else(|e| {
            warn!(%base, %quote, "Rate store lookup failed: {e}");
            None
        })
    }
}
