//! Batch import: categorize candidates and shape them for persistence.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use tally_core::{
    CategoryIndex, CategoryStore, CurrencyId, MatchingConfig, PatternScope, PatternStore,
    RawTransactionCandidate, ResolvedTransaction, StoreError, TransactionStore, UserId,
};

use crate::extract::extract_merchant;
use crate::matcher::{MatchTier, MerchantMatcher};
use crate::normalize::normalize;
use crate::registry::{PatternRegistry, ScoredCandidate};

/// Hard cap on fuzzy candidates kept per diagnostic.
pub const MAX_DIAGNOSTIC_CANDIDATES: usize = 5;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("No target currency given for import")]
    MissingCurrency,
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Everything one import needs, frozen for the duration of the batch.
pub struct ImportContext {
    pub user_id: UserId,
    pub currency_id: Option<CurrencyId>,
    pub user_patterns: PatternRegistry,
    pub global_patterns: PatternRegistry,
    pub categories: CategoryIndex,
    pub fuzzy_threshold: f32,
    pub diagnostic_candidates: usize,
}

impl ImportContext {
    pub fn new(
        user_id: UserId,
        currency_id: Option<CurrencyId>,
        user_patterns: PatternRegistry,
        global_patterns: PatternRegistry,
        categories: CategoryIndex,
    ) -> Self {
        let matching = MatchingConfig::default();
        Self {
            user_id,
            currency_id,
            user_patterns,
            global_patterns,
            categories,
            fuzzy_threshold: matching.fuzzy_threshold,
            diagnostic_candidates: matching.diagnostic_candidates,
        }
    }

    pub fn with_matching(mut self, matching: &MatchingConfig) -> Self {
        self.fuzzy_threshold = matching.fuzzy_threshold;
        self.diagnostic_candidates = matching.diagnostic_candidates;
        self
    }

    /// Snapshots the user's patterns, the global patterns and the categories.
    pub async fn load(
        patterns: &dyn PatternStore,
        categories: &dyn CategoryStore,
        user_id: UserId,
        currency_id: Option<CurrencyId>,
    ) -> Result<Self, ImportError> {
        let user_patterns = patterns.list_patterns(PatternScope::User(user_id)).await?;
        let global_patterns = patterns.list_patterns(PatternScope::Global).await?;
        let categories = categories.list_categories().await?;
        debug!(
            user = %user_id,
            user_patterns = user_patterns.len(),
            global_patterns = global_patterns.len(),
            categories = categories.len(),
            "Loaded import snapshot"
        );
        Ok(Self::new(
            user_id,
            currency_id,
            PatternRegistry::new(user_patterns),
            PatternRegistry::new(global_patterns),
            CategoryIndex::new(categories),
        ))
    }

    fn matcher(&self) -> MerchantMatcher<'_> {
        MerchantMatcher::new(&self.user_patterns, &self.global_patterns, &self.categories)
            .with_fuzzy_threshold(self.fuzzy_threshold)
    }
}

/// Why a record ended up without a category. For offline tuning.
#[derive(Debug, Clone, Serialize)]
pub struct UnmatchedDiagnostic {
    pub description: String,
    pub merchant: String,
    pub normalized_merchant: String,
    pub tier: MatchTier,
    pub reasons: Vec<String>,
    pub candidates: Vec<ScoredCandidate>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportOutcome {
    pub persistable: Vec<ResolvedTransaction>,
    pub matched_count: usize,
    pub unmatched_count: usize,
    /// Records left out of `persistable` for an empty description or bad date.
    pub dropped_count: usize,
    pub diagnostics: Vec<UnmatchedDiagnostic>,
}

/// Categorizes `records` against `context`. Bad records are dropped, never fatal.
pub fn import_batch(
    records: &[RawTransactionCandidate],
    context: &ImportContext,
) -> Result<ImportOutcome, ImportError> {
    let target_currency = context.currency_id.ok_or(ImportError::MissingCurrency)?;
    let matcher = context.matcher();
    let candidate_limit = context.diagnostic_candidates.min(MAX_DIAGNOSTIC_CANDIDATES);
    let mut outcome = ImportOutcome::default();
    let mut from_patterns = 0usize;

    for record in records {
        let resolution = matcher.resolve(record);
        if resolution.tier.is_pattern() {
            from_patterns += 1;
        }
        debug!(
            description = %record.description,
            tier = ?resolution.tier,
            category = ?resolution.category_id,
            "Resolved"
        );

        if resolution.category_id.is_some() {
            outcome.matched_count += 1;
        } else {
            outcome.unmatched_count += 1;
            let text = record.matching_text();
            let merchant = extract_merchant(text);
            outcome.diagnostics.push(UnmatchedDiagnostic {
                description: record.description.clone(),
                normalized_merchant: normalize(&merchant),
                merchant,
                tier: resolution.tier,
                reasons: resolution.reasons,
                candidates: matcher.top_candidates(record, candidate_limit),
            });
        }

        let description = record.description.trim();
        let Some(date) = record.parsed_date() else {
            debug!(date = %record.date, "Dropping record with unparseable date");
            outcome.dropped_count += 1;
            continue;
        };
        if description.is_empty() {
            outcome.dropped_count += 1;
            continue;
        }

        outcome.persistable.push(ResolvedTransaction {
            user_id: context.user_id,
            transaction_type: record.transaction_type(),
            amount: record.amount.abs(),
            description: description.to_string(),
            date,
            category_id: resolution.category_id,
            currency_id: record.currency_id.unwrap_or(target_currency),
        });
    }

    info!(
        records = records.len(),
        persistable = outcome.persistable.len(),
        matched = outcome.matched_count,
        from_patterns,
        unmatched = outcome.unmatched_count,
        dropped = outcome.dropped_count,
        "Import batch categorized"
    );
    Ok(outcome)
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub outcome: ImportOutcome,
    /// Rows actually inserted; duplicates of existing rows are not counted.
    pub created: usize,
}

/// Loads a snapshot, runs [`import_batch`] and persists the result.
pub struct BatchImporter {
    patterns: Arc<dyn PatternStore>,
    categories: Arc<dyn CategoryStore>,
    transactions: Arc<dyn TransactionStore>,
    matching: MatchingConfig,
}

impl BatchImporter {
    pub fn new(
        patterns: Arc<dyn PatternStore>,
        categories: Arc<dyn CategoryStore>,
        transactions: Arc<dyn TransactionStore>,
    ) -> Self {
        Self {
            patterns,
            categories,
            transactions,
            matching: MatchingConfig::default(),
        }
    }

    pub fn with_matching(mut self, matching: MatchingConfig) -> Self {
        self.matching = matching;
        self
    }

    pub async fn import(
        &self,
        records: &[RawTransactionCandidate],
        user_id: UserId,
        currency_id: Option<CurrencyId>,
    ) -> Result<ImportReport, ImportError> {
        if currency_id.is_none() {
            return Err(ImportError::MissingCurrency);
        }
        let context = ImportContext::load(
            self.patterns.as_ref(),
            self.categories.as_ref(),
            user_id,
            currency_id,
        )
        .await?
        .with_matching(&self.matching);

        let outcome = import_batch(records, &context)?;
        let created = self.transactions.insert_transactions(&outcome.persistable).await?;
        info!(user = %user_id, created, "Import persisted");
        Ok(ImportReport { outcome, created })
    }
}
