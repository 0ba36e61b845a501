//! Learning user merchant patterns from category corrections.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use tally_core::{CategoryId, CategoryStore, MerchantPattern, PatternScope, PatternStore, StoreError, UserId};

use crate::extract::extract_merchant;
use crate::normalize::normalize;

/// Shortest normalized merchant worth remembering.
const MIN_MERCHANT_LEN: usize = 2;

/// "Transactions described like this belong in that category."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub description: String,
    pub category_id: CategoryId,
}

impl Correction {
    pub fn new(description: &str, category_id: CategoryId) -> Self {
        Self {
            description: description.to_string(),
            category_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum LearnError {
    #[error("Could not extract a merchant from '{0}'")]
    NoMerchant(String),
    #[error("Category {0} does not exist")]
    UnknownCategory(CategoryId),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl LearnError {
    /// Rejected input, as opposed to a storage failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, LearnError::NoMerchant(_) | LearnError::UnknownCategory(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LearnReport {
    pub learned: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Upserts one user pattern per correction, `batch_width` at a time.
///
/// Never fails as a whole: each correction's error is logged and counted.
pub async fn learn_patterns(
    patterns: Arc<dyn PatternStore>,
    categories: Arc<dyn CategoryStore>,
    corrections: Vec<Correction>,
    user_id: UserId,
    batch_width: usize,
) -> LearnReport {
    let mut report = LearnReport::default();
    let width = batch_width.max(1);

    for chunk in corrections.chunks(width) {
        let mut set = JoinSet::new();
        for correction in chunk.iter().cloned() {
            let patterns = Arc::clone(&patterns);
            let categories = Arc::clone(&categories);
            set.spawn(async move {
                let result = learn_one(patterns.as_ref(), categories.as_ref(), &correction, user_id).await;
                (correction, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(pattern))) => {
                    debug!(pattern = %pattern.normalized, count = pattern.match_count, "Learned pattern");
                    report.learned += 1;
                }
                Ok((correction, Err(e))) if e.is_rejection() => {
                    warn!(description = %correction.description, "Skipping correction: {e}");
                    report.skipped += 1;
                }
                Ok((correction, Err(e))) => {
                    warn!(description = %correction.description, "Failed to learn pattern: {e}");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!("Learning task aborted: {e}");
                    report.failed += 1;
                }
            }
        }
    }

    info!(
        user = %user_id,
        learned = report.learned,
        skipped = report.skipped,
        failed = report.failed,
        "Pattern learning finished"
    );
    report
}

async fn learn_one(
    patterns: &dyn PatternStore,
    categories: &dyn CategoryStore,
    correction: &Correction,
    user_id: UserId,
) -> Result<MerchantPattern, LearnError> {
    let merchant = extract_merchant(&correction.description);
    let normalized = normalize(&merchant);
    if normalized.chars().count() < MIN_MERCHANT_LEN {
        return Err(LearnError::NoMerchant(correction.description.clone()));
    }
    if categories.get_category(correction.category_id).await?.is_none() {
        return Err(LearnError::UnknownCategory(correction.category_id));
    }
    let pattern = patterns
        .upsert_pattern(PatternScope::User(user_id), &merchant, &normalized, correction.category_id)
        .await?;
    Ok(pattern)
}
