//! Pulls the merchant out of a raw bank description.

use crate::util::{collapse_whitespace, is_numeric, re};

// ── Compiled regex cache ─────────────────────────────────────────────────────

re!(re_utility_payment,
    r"(?i)^payments?\s+(?:for\s+)?(?:electricity|electric|gas|heating|water|internet|phone|mobile|cleaning|elevator|utility|utilities)\s*-\s*(.+)$");
re!(re_segment_separator, r"\s+-\s+");
re!(re_parenthetical, r"\([^)]*\)");
re!(re_legal_suffix, r"(?i)\b(?:llc|inc|corp|corporation|ltd|limited|co|company)\b");

re!(re_processor, r"(?i)(?:vip\s*pay|tpay|pay)\w*\s*\*\s*([^*]+)");
re!(re_processor_token, r"(?i)vip\s*pay|tpay|pay");

re!(re_prefix_georgian, r"^საბარათე\s*ოპერაცია\s*გადახდა\s*[-–—]\s*");
re!(re_prefix_card_op_payment, r"(?i)^card\s+operation\s+payment\s*-\s*");
re!(re_prefix_card_op_withdrawal, r"(?i)^card\s+operation\s+(?:cash\s+)?withdrawal\s*-\s*");
re!(re_prefix_card_payment, r"(?i)^card\s+payment\s*-\s*");
re!(re_prefix_payment_dash, r"(?i)^payment\s*-\s*");
re!(re_prefix_transaction, r"(?i)^transaction\s*-\s*");
re!(re_prefix_payments, r"(?i)^payments?\s+");

re!(re_card_number, r"\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}");
re!(re_date_dotted, r"\d{2}\.\d{2}\.\d{4}");
re!(re_date_slashed, r"\d{2}/\d{2}/\d{4}");
re!(re_leading_number, r"^\d+\s*-\s*");
re!(re_trailing_amount, r"(?i)\s+\d+(?:[.,]\d{2})?\s*(?:GEL|USD|EUR|GBP|RUB|TRY)?\s*$");
re!(re_trailing_currency, r"(?i)\s+(?:GEL|USD|EUR|GBP|RUB|TRY)\s*$");

const MAX_FALLBACK_TOKENS: usize = 5;

/// Best-effort merchant name for `description`. Strategies run in order and the
/// first that yields something usable wins.
pub fn extract_merchant(description: &str) -> String {
    let description = description.trim();
    if description.is_empty() {
        return String::new();
    }

    if let Some(merchant) = from_utility_payment(description) {
        return merchant;
    }

    let stripped = strip_prefixes(description);

    if let Some(merchant) = from_payment_processor(&stripped) {
        return merchant;
    }

    let cleaned = strip_noise(&stripped);
    let merchant = first_tokens(&cleaned);
    if merchant.is_empty() {
        first_tokens(description)
    } else {
        merchant
    }
}

/// `Payment electricity - Telmiko - LLC Telmiko (Electricity) - 5985142` → `Telmiko`.
fn from_utility_payment(description: &str) -> Option<String> {
    let caps = re_utility_payment().captures(description)?;
    let rest = caps.get(1)?.as_str();
    let merchant = re_segment_separator()
        .split(rest)
        .next()
        .unwrap_or(rest);
    let merchant = re_parenthetical().replace_all(merchant, " ");
    let merchant = re_legal_suffix().replace_all(&merchant, " ");
    let merchant = collapse_whitespace(merchant.trim_matches(|c: char| c == '-' || c.is_whitespace()));
    (!merchant.is_empty() && !is_numeric(&merchant)).then_some(merchant)
}

/// `Vip Pay*YANDEX.GO` → `YANDEX GO`; `AMAZON * 12AB34` → `AMAZON`.
fn from_payment_processor(text: &str) -> Option<String> {
    let segment = if let Some(caps) = re_processor().captures(text) {
        let merchant = caps.get(1)?.as_str();
        re_processor_token().replace_all(merchant, "").into_owned()
    } else {
        let (head, _) = text.split_once('*')?;
        head.to_string()
    };

    let segment = re_legal_suffix().replace_all(&segment, " ");
    let merchant = collapse_whitespace(&segment.replace('.', " "));
    let long_enough = merchant.chars().filter(|c| !c.is_whitespace()).count() >= 3;
    (long_enough && !is_numeric(&merchant.replace(' ', ""))).then_some(merchant)
}

fn strip_prefixes(description: &str) -> String {
    let prefixes = [
        re_prefix_georgian(),
        re_prefix_card_op_payment(),
        re_prefix_card_op_withdrawal(),
        re_prefix_card_payment(),
        re_prefix_payment_dash(),
        re_prefix_transaction(),
        re_prefix_payments(),
    ];
    let mut cleaned = description.to_string();
    for re in prefixes {
        cleaned = re.replace(&cleaned, "").into_owned();
    }
    cleaned.trim().to_string()
}

/// Drops card numbers, dates and trailing amount/currency tokens.
fn strip_noise(text: &str) -> String {
    let mut cleaned = re_card_number().replace_all(text, " ").into_owned();
    cleaned = re_date_dotted().replace_all(&cleaned, " ").into_owned();
    cleaned = re_date_slashed().replace_all(&cleaned, " ").into_owned();
    cleaned = collapse_whitespace(&cleaned);
    cleaned = re_leading_number().replace(&cleaned, "").into_owned();
    // An amount can hide behind a currency code and vice versa.
    loop {
        let next = re_trailing_amount().replace(&cleaned, "");
        let next = re_trailing_currency().replace(&next, "").into_owned();
        if next == cleaned {
            break;
        }
        cleaned = next;
    }
    cleaned.trim().to_string()
}

/// Up to five tokens of two or more characters that are not bare numbers.
fn first_tokens(text: &str) -> String {
    let joined = text
        .split_whitespace()
        .filter(|w| w.chars().count() >= 2 && !is_numeric(w))
        .take(MAX_FALLBACK_TOKENS)
        .collect::<Vec<_>>()
        .join(" ");
    collapse_whitespace(&joined.replace('.', " "))
}
