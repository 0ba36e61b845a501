//! Tiered category resolution for a single candidate.
//!
//! Tiers are tried in priority order and the first one that decides wins:
//!
//! | Tier | Source                                       |
//! |------|----------------------------------------------|
//! | 0    | explicit user category (assign or clear)     |
//! | 1    | income is never auto-categorized             |
//! | 2    | special-transaction classifier               |
//! | 3    | user patterns: exact, word overlap, fuzzy    |
//! | 4    | global patterns: exact, word overlap, fuzzy  |
//! | 5    | upstream suggested category                  |
//! | 6    | uncategorized                                |

use serde::{Deserialize, Serialize};
use tracing::debug;

use tally_core::{CategoryId, CategoryIndex, RawTransactionCandidate, TransactionType};

use crate::extract::extract_merchant;
use crate::normalize::normalize;
use crate::registry::{PatternSet, ScoredCandidate};
use crate::special::{classify_special, SpecialKind};

pub const DEFAULT_FUZZY_THRESHOLD: f32 = 0.85;

/// Which rule decided a [`Resolution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Explicit,
    Income,
    Special,
    UserExact,
    UserWords,
    UserFuzzy,
    GlobalExact,
    GlobalWords,
    GlobalFuzzy,
    Upstream,
    Unmatched,
}

impl MatchTier {
    /// True for tiers that come from stored merchant patterns.
    pub fn is_pattern(self) -> bool {
        matches!(
            self,
            MatchTier::UserExact
                | MatchTier::UserWords
                | MatchTier::UserFuzzy
                | MatchTier::GlobalExact
                | MatchTier::GlobalWords
                | MatchTier::GlobalFuzzy
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub category_id: Option<CategoryId>,
    pub tier: MatchTier,
    /// Why each tier before `tier` did not decide, in order.
    pub reasons: Vec<String>,
}

impl Resolution {
    fn decided(category_id: Option<CategoryId>, tier: MatchTier, reasons: Vec<String>) -> Self {
        Self { category_id, tier, reasons }
    }
}

#[derive(Clone, Copy)]
enum Scope {
    User,
    Global,
}

impl Scope {
    fn label(self) -> &'static str {
        match self {
            Scope::User => "user",
            Scope::Global => "global",
        }
    }

    fn tiers(self) -> [MatchTier; 3] {
        match self {
            Scope::User => [MatchTier::UserExact, MatchTier::UserWords, MatchTier::UserFuzzy],
            Scope::Global => [MatchTier::GlobalExact, MatchTier::GlobalWords, MatchTier::GlobalFuzzy],
        }
    }
}

/// Resolves categories against one batch's pattern snapshots. Pure; no I/O.
pub struct MerchantMatcher<'a> {
    user_patterns: &'a dyn PatternSet,
    global_patterns: &'a dyn PatternSet,
    categories: &'a CategoryIndex,
    fuzzy_threshold: f32,
}

impl<'a> MerchantMatcher<'a> {
    pub fn new(
        user_patterns: &'a dyn PatternSet,
        global_patterns: &'a dyn PatternSet,
        categories: &'a CategoryIndex,
    ) -> Self {
        Self {
            user_patterns,
            global_patterns,
            categories,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }

    pub fn with_fuzzy_threshold(mut self, threshold: f32) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }

    pub fn resolve(&self, record: &RawTransactionCandidate) -> Resolution {
        let mut reasons = Vec::new();

        if let Some(explicit) = record.user_category {
            let category_id = match explicit.category_id() {
                Some(id) if !self.categories.contains(id) => {
                    reasons.push(format!("explicit category {id} does not exist"));
                    None
                }
                other => other,
            };
            return Resolution::decided(category_id, MatchTier::Explicit, reasons);
        }
        reasons.push("no explicit category".to_string());

        if record.transaction_type() == TransactionType::Income {
            reasons.push("income is not auto-categorized".to_string());
            return Resolution::decided(None, MatchTier::Income, reasons);
        }

        let text = record.matching_text();
        match classify_special(text) {
            SpecialKind::Exclude => {
                reasons.push("special transaction excluded from matching".to_string());
                return Resolution::decided(None, MatchTier::Special, reasons);
            }
            SpecialKind::Category(name) => match self.categories.find_by_name(&name) {
                Some(category) => {
                    return Resolution::decided(Some(category.id), MatchTier::Special, reasons);
                }
                None => reasons.push(format!("special category '{name}' does not exist")),
            },
            SpecialKind::None => reasons.push("not a special transaction".to_string()),
        }

        let merchant = normalize(&extract_merchant(text));

        for scope in [Scope::User, Scope::Global] {
            if let Some((category_id, tier)) = self.match_scope(scope, &merchant, text, &mut reasons) {
                debug!(%category_id, ?tier, merchant = %merchant, "Pattern match");
                return Resolution::decided(Some(category_id), tier, reasons);
            }
        }

        match record.suggested_category.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => match self.categories.find_by_name(name) {
                Some(category) => {
                    return Resolution::decided(Some(category.id), MatchTier::Upstream, reasons);
                }
                None => reasons.push(format!("suggested category '{name}' does not exist")),
            },
            _ => reasons.push("no suggested category".to_string()),
        }

        Resolution::decided(None, MatchTier::Unmatched, reasons)
    }

    /// Best fuzzy candidates across both scopes, descending, scores above zero only.
    pub fn top_candidates(&self, record: &RawTransactionCandidate, limit: usize) -> Vec<ScoredCandidate> {
        let text = record.matching_text();
        let merchant = normalize(&extract_merchant(text));
        let mut all: Vec<ScoredCandidate> = self
            .user_patterns
            .score_candidates(&merchant, text)
            .into_iter()
            .chain(self.global_patterns.score_candidates(&merchant, text))
            .filter(|c| c.score > 0.0)
            .collect();
        all.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        all.truncate(limit);
        all
    }

    fn match_scope(
        &self,
        scope: Scope,
        merchant: &str,
        text: &str,
        reasons: &mut Vec<String>,
    ) -> Option<(CategoryId, MatchTier)> {
        let patterns = match scope {
            Scope::User => self.user_patterns,
            Scope::Global => self.global_patterns,
        };
        let label = scope.label();
        let [exact_tier, words_tier, fuzzy_tier] = scope.tiers();

        if patterns.is_empty() {
            reasons.push(format!("{label}: no patterns"));
            return None;
        }

        if merchant.is_empty() {
            reasons.push(format!("{label}: no merchant extracted"));
        } else if let Some(p) = patterns.find_exact(merchant) {
            return Some((p.category_id, exact_tier));
        } else {
            reasons.push(format!("{label}: no exact pattern for '{merchant}'"));
        }

        if let Some(p) = patterns.find_by_words(text) {
            return Some((p.category_id, words_tier));
        }
        reasons.push(format!("{label}: no word overlap"));

        let scored = patterns.score_candidates(merchant, text);
        match scored.first() {
            Some(best) if best.score >= self.fuzzy_threshold => Some((best.category_id, fuzzy_tier)),
            Some(best) => {
                reasons.push(format!(
                    "{label}: best fuzzy '{}' scored {:.2}, below {:.2}",
                    best.pattern, best.score, self.fuzzy_threshold
                ));
                None
            }
            None => {
                reasons.push(format!("{label}: no fuzzy candidates"));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tally_core::{
        Category, CategoryType, ExplicitCategory, MerchantPattern, Money, PatternScope, UserId,
    };

    use crate::registry::PatternRegistry;

    fn categories() -> CategoryIndex {
        CategoryIndex::new(vec![
            Category::new(1, "Groceries", CategoryType::Expense),
            Category::new(2, "Transportation", CategoryType::Expense),
            Category::new(5, "Restaurants", CategoryType::Expense),
            Category::new(9, "Other", CategoryType::Either),
            Category::new(12, "Clothes", CategoryType::Expense),
        ])
    }

    fn registry(scope: PatternScope, entries: &[(&str, i64)]) -> PatternRegistry {
        PatternRegistry::new(
            entries
                .iter()
                .map(|(p, c)| MerchantPattern::new(scope, p, &normalize(p), CategoryId(*c)))
                .collect(),
        )
    }

    fn user(entries: &[(&str, i64)]) -> PatternRegistry {
        registry(PatternScope::User(UserId(1)), entries)
    }

    fn global(entries: &[(&str, i64)]) -> PatternRegistry {
        registry(PatternScope::Global, entries)
    }

    fn expense(description: &str) -> RawTransactionCandidate {
        RawTransactionCandidate::new(description, Money::from_cents(-1250), "2025-11-11")
    }

    /// Counts every lookup so tests can prove a scope was never consulted.
    struct CountingSet {
        inner: PatternRegistry,
        calls: AtomicUsize,
    }

    impl CountingSet {
        fn new(inner: PatternRegistry) -> Self {
            Self { inner, calls: AtomicUsize::new(0) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PatternSet for CountingSet {
        fn find_exact(&self, normalized_merchant: &str) -> Option<&MerchantPattern> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.find_exact(normalized_merchant)
        }

        fn find_by_words(&self, description: &str) -> Option<&MerchantPattern> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.find_by_words(description)
        }

        fn score_candidates(&self, merchant: &str, description: &str) -> Vec<ScoredCandidate> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.score_candidates(merchant, description)
        }

        fn len(&self) -> usize {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.len()
        }
    }

    #[test]
    fn starbucks_resolves_by_word_overlap() {
        let (u, g, c) = (user(&[("starbucks", 5)]), global(&[]), categories());
        let matcher = MerchantMatcher::new(&u, &g, &c);
        let res = matcher.resolve(&expense("STARBUCKS #4521"));
        assert_eq!(res.category_id, Some(CategoryId(5)));
        assert_eq!(res.tier, MatchTier::UserWords);
        assert!(res.tier.is_pattern());
        assert!(!MatchTier::Upstream.is_pattern());
        assert!(!MatchTier::Explicit.is_pattern());
    }

    #[test]
    fn exact_user_match_never_consults_global_or_upstream() {
        let u = user(&[("yandex go", 2)]);
        let g = CountingSet::new(global(&[("yandex go", 9)]));
        let c = categories();
        let matcher = MerchantMatcher::new(&u, &g, &c);

        let mut record = expense("Vip Pay*YANDEX.GO");
        record.suggested_category = Some("restaurants".into());
        let res = matcher.resolve(&record);

        assert_eq!(res.category_id, Some(CategoryId(2)));
        assert_eq!(res.tier, MatchTier::UserExact);
        assert_eq!(g.calls(), 0);
    }

    #[test]
    fn explicit_category_wins_over_everything() {
        let (u, g, c) = (user(&[("starbucks", 5)]), global(&[]), categories());
        let matcher = MerchantMatcher::new(&u, &g, &c);

        let mut record = expense("STARBUCKS #4521");
        record.user_category = Some(ExplicitCategory::Assign(CategoryId(1)));
        assert_eq!(matcher.resolve(&record).category_id, Some(CategoryId(1)));

        record.user_category = Some(ExplicitCategory::Clear);
        let res = matcher.resolve(&record);
        assert_eq!(res.category_id, None);
        assert_eq!(res.tier, MatchTier::Explicit);
    }

    #[test]
    fn unknown_explicit_category_is_cleared_with_reason() {
        let (u, g, c) = (user(&[("starbucks", 5)]), global(&[]), categories());
        let matcher = MerchantMatcher::new(&u, &g, &c);

        let mut record = expense("STARBUCKS #4521");
        record.user_category = Some(ExplicitCategory::Assign(CategoryId(9999)));
        let res = matcher.resolve(&record);
        assert_eq!(res.category_id, None);
        assert_eq!(res.tier, MatchTier::Explicit);
        assert!(res.reasons[0].contains("9999"), "{:?}", res.reasons);
    }

    #[test]
    fn income_is_never_auto_categorized() {
        let u = CountingSet::new(user(&[("salary", 9)]));
        let (g, c) = (global(&[]), categories());
        let matcher = MerchantMatcher::new(&u, &g, &c);

        let mut record = RawTransactionCandidate::new("SALARY", Money::from_cents(250_000), "2025-11-01");
        record.suggested_category = Some("other".into());
        let res = matcher.resolve(&record);

        assert_eq!(res.category_id, None);
        assert_eq!(res.tier, MatchTier::Income);
        assert_eq!(u.calls(), 0);
    }

    #[test]
    fn special_descriptions_beat_patterns() {
        let (u, g, c) = (user(&[("atm", 1), ("currency exchange", 1)]), global(&[]), categories());
        let matcher = MerchantMatcher::new(&u, &g, &c);

        let res = matcher.resolve(&expense("ATM withdrawal TBC"));
        assert_eq!(res.category_id, None);
        assert_eq!(res.tier, MatchTier::Special);

        let res = matcher.resolve(&expense("Currency Exchange"));
        assert_eq!(res.category_id, None);

        let res = matcher.resolve(&expense("Monthly service fee"));
        assert_eq!(res.category_id, Some(CategoryId(9)));
        assert_eq!(res.tier, MatchTier::Special);
    }

    #[test]
    fn translated_description_is_used_for_matching() {
        let (u, g, c) = (user(&[("nikora", 1)]), global(&[]), categories());
        let matcher = MerchantMatcher::new(&u, &g, &c);

        let mut record = expense("საბარათე ოპერაცია - ნიკორა");
        record.translated_description = Some("Card payment - Nikora".into());
        assert_eq!(matcher.resolve(&record).category_id, Some(CategoryId(1)));
    }

    #[test]
    fn falls_back_to_global_patterns() {
        let (u, g, c) = (user(&[("nikora", 1)]), global(&[("h&m", 12)]), categories());
        let matcher = MerchantMatcher::new(&u, &g, &c);
        let res = matcher.resolve(&expense("H&M"));
        assert_eq!(res.category_id, Some(CategoryId(12)));
        assert_eq!(res.tier, MatchTier::GlobalExact);
    }

    #[test]
    fn fuzzy_tier_accepts_at_threshold() {
        // Short words escape word overlap; every token of "kfc bar" is shared, score 0.90.
        let (u, g, c) = (user(&[("bar vake kfc", 5)]), global(&[]), categories());
        let matcher = MerchantMatcher::new(&u, &g, &c);
        let res = matcher.resolve(&expense("KFC BAR"));
        assert_eq!(res.tier, MatchTier::UserFuzzy);
        assert_eq!(res.category_id, Some(CategoryId(5)));

        let strict = MerchantMatcher::new(&u, &g, &c).with_fuzzy_threshold(0.95);
        assert_eq!(strict.resolve(&expense("KFC BAR")).tier, MatchTier::Unmatched);
    }

    #[test]
    fn upstream_suggestion_is_alias_mapped() {
        let (u, g, c) = (user(&[]), global(&[]), categories());
        let matcher = MerchantMatcher::new(&u, &g, &c);
        let mut record = expense("UNKNOWN SHOP");
        record.suggested_category = Some("Grocery".into());
        let res = matcher.resolve(&record);
        assert_eq!(res.category_id, Some(CategoryId(1)));
        assert_eq!(res.tier, MatchTier::Upstream);
    }

    #[test]
    fn unmatched_collects_reasons_in_order() {
        let (u, g, c) = (user(&[("nikora", 1)]), global(&[]), categories());
        let matcher = MerchantMatcher::new(&u, &g, &c);
        let res = matcher.resolve(&expense("QWERTY"));
        assert_eq!(res.category_id, None);
        assert_eq!(res.tier, MatchTier::Unmatched);
        assert_eq!(res.reasons[0], "no explicit category");
        assert!(res.reasons.iter().any(|r| r.starts_with("user: no exact pattern")));
        assert!(res.reasons.contains(&"global: no patterns".to_string()));
        assert_eq!(res.reasons.last().unwrap(), "no suggested category");
    }

    #[test]
    fn top_candidates_are_capped_and_sorted() {
        let u = user(&[("starbucks", 5), ("starbucks reserve", 5), ("star", 5)]);
        let g = global(&[("starbucks coffee", 5), ("bucks", 5), ("nikora", 1)]);
        let c = categories();
        let matcher = MerchantMatcher::new(&u, &g, &c);
        let top = matcher.top_candidates(&expense("STARBUCKS #4521"), 3);
        assert_eq!(top.len(), 3);
        assert!(top.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(top.iter().all(|c| c.score > 0.0));
    }
}
