//! Process-lifetime memo of resolved rates.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tally_core::CurrencyId;

/// `(base, quote, day)`.
pub type RateKey = (CurrencyId, CurrencyId, NaiveDate);

/// Only rates that are current for their key belong here; fallbacks do not.
#[derive(Debug, Default)]
pub struct RateCache {
    entries: RwLock<HashMap<RateKey, Decimal>>,
}

impl RateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &RateKey) -> Option<Decimal> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    /// Replaces any earlier value for `key`.
    pub fn insert(&self, key: RateKey, rate: Decimal) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, rate);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(d: u32) -> RateKey {
        (CurrencyId(1), CurrencyId(2), NaiveDate::from_ymd_opt(2025, 1, d).unwrap())
    }

    #[test]
    fn insert_overwrites() {
        let cache = RateCache::new();
        assert!(cache.get(&key(1)).is_none());
        cache.insert(key(1), Decimal::new(27, 1));
        cache.insert(key(1), Decimal::new(28, 1));
        assert_eq!(cache.get(&key(1)), Some(Decimal::new(28, 1)));
        assert!(cache.get(&key(2)).is_none());
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
