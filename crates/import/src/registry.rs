//! Immutable, per-import snapshots of merchant patterns.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use tally_core::{CategoryId, MerchantPattern};

use crate::fuzzy::{fuzzy_match, significant_words, words_overlap};
use crate::normalize::normalize;

/// A pattern scored against one transaction, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub pattern: String,
    pub category_id: CategoryId,
    pub score: f32,
}

/// Lookup operations the matcher needs from a pattern collection.
pub trait PatternSet: Send + Sync {
    /// Pattern whose normalized form equals `normalized_merchant`.
    fn find_exact(&self, normalized_merchant: &str) -> Option<&MerchantPattern>;

    /// First pattern, most specific first, that word-overlaps `description`.
    fn find_by_words(&self, description: &str) -> Option<&MerchantPattern>;

    /// Every pattern scored against the merchant and the description, best first.
    fn score_candidates(&self, merchant: &str, description: &str) -> Vec<ScoredCandidate>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Entry {
    pattern: MerchantPattern,
    words: Vec<String>,
}

/// Patterns for one scope, ordered most-specific first and indexed by normalized form.
pub struct PatternRegistry {
    entries: Vec<Entry>,
    exact: HashMap<String, usize>,
}

impl PatternRegistry {
    pub fn new(patterns: Vec<MerchantPattern>) -> Self {
        let mut entries: Vec<Entry> = patterns
            .into_iter()
            .map(|mut pattern| {
                if pattern.normalized.is_empty() {
                    pattern.normalized = normalize(&pattern.pattern);
                }
                let words = significant_words(&pattern.normalized, false);
                Entry { pattern, words }
            })
            .collect();

        // More significant words first, then longer strings, then the most used.
        entries.sort_by(|a, b| {
            b.words
                .len()
                .cmp(&a.words.len())
                .then_with(|| b.pattern.normalized.len().cmp(&a.pattern.normalized.len()))
                .then_with(|| b.pattern.match_count.cmp(&a.pattern.match_count))
        });

        let mut exact = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            exact.entry(entry.pattern.normalized.clone()).or_insert(idx);
        }

        Self { entries, exact }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn patterns(&self) -> impl Iterator<Item = &MerchantPattern> {
        self.entries.iter().map(|e| &e.pattern)
    }
}

impl PatternSet for PatternRegistry {
    fn find_exact(&self, normalized_merchant: &str) -> Option<&MerchantPattern> {
        if normalized_merchant.is_empty() {
            return None;
        }
        self.exact
            .get(normalized_merchant)
            .map(|&idx| &self.entries[idx].pattern)
    }

    fn find_by_words(&self, description: &str) -> Option<&MerchantPattern> {
        let desc_normalized = normalize(description);
        if desc_normalized.is_empty() {
            return None;
        }
        let desc_words = significant_words(description, true);
        self.entries
            .iter()
            .find(|e| words_overlap(&desc_normalized, &desc_words, &e.pattern.normalized, &e.words))
            .map(|e| &e.pattern)
    }

    fn score_candidates(&self, merchant: &str, description: &str) -> Vec<ScoredCandidate> {
        let description = description.to_lowercase();
        let mut scored: Vec<ScoredCandidate> = self
            .entries
            .iter()
            .map(|e| {
                let score = fuzzy_match(merchant, &e.pattern.normalized)
                    .max(fuzzy_match(&description, &e.pattern.normalized));
                ScoredCandidate {
                    pattern: e.pattern.normalized.clone(),
                    category_id: e.pattern.category_id,
                    score,
                }
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
