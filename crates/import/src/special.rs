//! Recognises money movements that are not merchant purchases.

use serde::{Deserialize, Serialize};

/// Outcome of [`classify_special`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "category")]
pub enum SpecialKind {
    /// Ordinary purchase; continue with merchant matching.
    None,
    /// Persist uncategorized and skip merchant matching.
    Exclude,
    /// Assign the category with this (lowercase) name.
    Category(String),
}

impl SpecialKind {
    pub fn is_none(&self) -> bool {
        matches!(self, SpecialKind::None)
    }
}

/// Case-insensitive substring rules, evaluated top to bottom.
pub fn classify_special(description: &str) -> SpecialKind {
    let desc = description.to_lowercase();
    if desc.trim().is_empty() {
        return SpecialKind::None;
    }
    let has = |needle: &str| desc.contains(needle);

    // Roundup / balance top-up
    if has("roundup")
        || has("round up")
        || (has("adding money") && has("account"))
        || (has("account") && has("balance") && (has("add") || has("round")))
        || (has("electronic") && has("service") && (has("account") || has("balance")))
    {
        return SpecialKind::Exclude;
    }

    // Currency exchange / conversion
    if has("currency exchange")
        || has("currency conversion")
        || has("cashless conversion")
        || (has("conversion") && !has("payment"))
        || (has("convert") && (has("currency") || has("cashless")))
        || (has("exchange") && has("currency"))
    {
        return SpecialKind::Exclude;
    }

    // Transfer fees
    if (has("transfer") && (has("fee") || has("commission")))
        || has("transfer charge")
    {
        return SpecialKind::Exclude;
    }

    // Private, personal and bank transfers
    if has("private transfer")
        || has("personal transfer")
        || has("money transfer")
        || has("transfer from")
        || has("transfer to")
        || (has("transfer") && (has("private") || has("personal") || has("bank")))
    {
        return SpecialKind::Exclude;
    }

    // Card deposits / top-ups
    if has("card deposit")
        || has("deposit to card")
        || has("top up card")
        || has("card top up")
        || has("card top-up")
        || (has("deposit") && has("card"))
    {
        return SpecialKind::Exclude;
    }

    // Commissions and fees
    if (has("commission") || has("service fee") || has("transaction fee"))
        && !has("payment")
        && !has("transfer")
    {
        return SpecialKind::Category("other".to_string());
    }

    // ATM / cash withdrawal
    if has("atm")
        || has("cash withdrawal")
        || (has("withdrawal") && (has("cash") || has("card operation")))
    {
        return SpecialKind::Exclude;
    }

    SpecialKind::None
}
