//! Canonical form of merchant and description text, used as the matching key.

use crate::util::{collapse_whitespace, re};

re!(re_h_and_m, r"\bh\s*&\s*m\b");
re!(re_dot_underscore, r"[._]");
re!(re_punctuation, r"[^\w\s]");
re!(
    re_legal_suffix,
    r"\b(?:llc|inc|corp|corporation|ltd|limited|co|company|textile)\b"
);

/// Multi-word spellings rewritten to a single canonical phrase.
const PHRASE_ALIASES: &[(&str, &str)] = &[
    ("hennes and mauritz", "hm"),
    ("cashless conversion", "currency exchange"),
    ("exchange amount", "currency exchange"),
];

/// Lowercases, folds aliases, strips legal suffixes and punctuation, collapses whitespace.
///
/// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let s = re_h_and_m().replace_all(&lowered, "hm");
    let s = re_dot_underscore().replace_all(&s, " ");
    let s = re_punctuation().replace_all(&s, " ");
    let mut current = collapse_whitespace(&s);

    // Suffix removal can bring alias words together and vice versa, so run to a fixed point.
    // Each pass either removes a token or consumes an alias phrase, so this terminates.
    loop {
        let next = fold_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn fold_once(s: &str) -> String {
    let stripped = collapse_whitespace(&re_legal_suffix().replace_all(s, " "));
    let mut padded = format!(" {stripped} ");
    for (from, to) in PHRASE_ALIASES {
        let needle = format!(" {from} ");
        while padded.contains(&needle) {
            padded = padded.replacen(&needle, &format!(" {to} "), 1);
        }
    }
    collapse_whitespace(&padded)
}
