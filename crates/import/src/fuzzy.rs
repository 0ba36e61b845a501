//! Similarity scoring between merchant strings.

use std::collections::BTreeSet;

use crate::normalize::normalize;
use crate::util::is_numeric;

/// Character-set overlap below this is treated as coincidence.
const MIN_CHAR_SIMILARITY: f32 = 0.75;

/// Words that appear in bank descriptions but never identify a merchant.
pub const NOISE_WORDS: &[&str] = &[
    "card", "payment", "payments", "operation", "transaction", "gel", "usd", "eur", "gbp",
    "rub", "currency", "amount", "total", "fee", "charge", "tpay", "pay", "vip", "llc", "inc",
    "ltd", "limited", "corp", "corporation", "service", "services", "group", "delivery",
    "transfer", "transfers", "private", "გადახდა", "ოპერაცია", "საბარათე", "გადარიცხვა",
    "ჩარიცხვა", "სხვა", "სხვადასხვა", "ბანკიდან",
];

/// Place names that decorate descriptions ("… TBILISI GE").
pub const LOCATION_WORDS: &[&str] = &["tbilisi", "georgia", "georgian", "batumi"];

pub fn is_location_word(word: &str) -> bool {
    LOCATION_WORDS.contains(&word)
}

/// Similarity in `[0, 1]` between two merchant strings. Commutative.
pub fn fuzzy_match(a: &str, b: &str) -> f32 {
    // Identical input scores 1 even when normalization leaves nothing ("LLC").
    let (raw1, raw2) = (a.trim(), b.trim());
    if !raw1.is_empty() && raw1.to_lowercase() == raw2.to_lowercase() {
        return 1.0;
    }

    let s1 = normalize(a);
    let s2 = normalize(b);

    if s1 == s2 {
        return if s1.is_empty() { 0.0 } else { 1.0 };
    }
    if s1.is_empty() || s2.is_empty() {
        return 0.0;
    }

    // Containment, scaled by how much of the longer string is covered.
    if s1.contains(&s2) || s2.contains(&s1) {
        let (l1, l2) = (s1.chars().count() as f32, s2.chars().count() as f32);
        return 0.75 + (l1.min(l2) / l1.max(l2)) * 0.20;
    }

    let words1: BTreeSet<&str> = s1.split(' ').filter(|w| w.chars().count() > 1).collect();
    let words2: BTreeSet<&str> = s2.split(' ').filter(|w| w.chars().count() > 1).collect();
    if !words1.is_empty() && !words2.is_empty() {
        let shared = words1.intersection(&words2).count();
        if shared > 0 {
            let shorter = words1.len().min(words2.len());
            let longer = words1.len().max(words2.len());
            if shared == shorter {
                return 0.80 + (shared as f32 / longer as f32) * 0.15;
            }
            return 0.50 + (shared as f32 / longer as f32) * 0.25;
        }
    }

    let chars1: BTreeSet<char> = s1.chars().collect();
    let chars2: BTreeSet<char> = s2.chars().collect();
    let union = chars1.union(&chars2).count();
    if union == 0 {
        return 0.0;
    }
    let similarity = chars1.intersection(&chars2).count() as f32 / union as f32;
    if similarity >= MIN_CHAR_SIMILARITY {
        similarity
    } else {
        0.0
    }
}

/// Tokens that plausibly name a merchant: normalized, at least three characters,
/// not numeric, not noise. Location words are dropped when `drop_locations` is set.
pub fn significant_words(text: &str, drop_locations: bool) -> Vec<String> {
    normalize(text)
        .split(' ')
        .filter(|w| w.chars().count() >= 3)
        .filter(|w| !is_numeric(w))
        .filter(|w| !NOISE_WORDS.contains(w))
        .filter(|w| !(drop_locations && is_location_word(w)))
        .map(str::to_string)
        .collect()
}

/// Word-overlap test between a description and one stored pattern.
///
/// `desc_normalized` and `desc_words` are precomputed by the caller since the
/// same description is tested against many patterns.
pub fn words_overlap(
    desc_normalized: &str,
    desc_words: &[String],
    pattern_normalized: &str,
    pattern_words: &[String],
) -> bool {
    if pattern_normalized.chars().count() < 2 || pattern_words.is_empty() {
        return false;
    }

    // Whole pattern appears in the description ("tbilisi metro").
    if desc_normalized.contains(pattern_normalized) {
        return true;
    }

    // A substantial pattern word equals, or is nested in, a description word.
    for pw in pattern_words.iter().filter(|w| w.chars().count() >= 4) {
        let hit = desc_words.iter().any(|dw| {
            dw == pw
                || (dw.chars().count() >= 4 && (dw.contains(pw.as_str()) || pw.contains(dw.as_str())))
        });
        if hit {
            return true;
        }
    }

    // Every non-location word of a multi-word pattern is somewhere in the description.
    if pattern_words.len() > 1 {
        let mut required = pattern_words.iter().filter(|w| !is_location_word(w)).peekable();
        if required.peek().is_some() && required.all(|w| desc_normalized.contains(w.as_str())) {
            return true;
        }
    }

    // Description is a fragment of a longer pattern.
    !desc_normalized.is_empty() && pattern_normalized.contains(desc_normalized)
}
