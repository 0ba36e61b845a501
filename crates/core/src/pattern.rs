use serde::{Deserialize, Serialize};
use std::fmt;

use crate::category::CategoryId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who a merchant pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternScope {
    User(UserId),
    Global,
}

impl PatternScope {
    pub fn owner(self) -> Option<UserId> {
        match self {
            PatternScope::User(id) => Some(id),
            PatternScope::Global => None,
        }
    }
}

impl fmt::Display for PatternScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternScope::User(id) => write!(f, "user:{id}"),
            PatternScope::Global => write!(f, "global"),
        }
    }
}

/// A learned or seeded merchant → category mapping.
///
/// Unique per `(scope, normalized)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantPattern {
    pub id: Option<i64>,
    pub scope: PatternScope,
    pub pattern: String,
    pub normalized: String,
    pub category_id: CategoryId,
    pub match_count: i64,
}

impl MerchantPattern {
    pub fn new(scope: PatternScope, pattern: &str, normalized: &str, category_id: CategoryId) -> Self {
        MerchantPattern {
            id: None,
            scope,
            pattern: pattern.to_string(),
            normalized: normalized.to_string(),
            category_id,
            match_count: 1,
        }
    }
}

/// Shared merchant patterns seeded for every installation: `(pattern, category name)`.
/// Patterns are already in normalized form.
pub const DEFAULT_MERCHANTS: &[(&str, &str)] = &[
    // Groceries
    ("walmart", "Groceries"),
    ("costco", "Groceries"),
    ("kroger", "Groceries"),
    ("safeway", "Groceries"),
    ("whole foods", "Groceries"),
    ("trader joes", "Groceries"),
    ("aldi", "Groceries"),
    ("lidl", "Groceries"),
    ("carrefour", "Groceries"),
    ("tesco", "Groceries"),
    ("spar", "Groceries"),
    ("nikora", "Groceries"),
    ("fresco", "Groceries"),
    ("ori nabiji", "Groceries"),
    ("agrohub", "Groceries"),
    // Restaurants
    ("starbucks", "Restaurants"),
    ("mcdonalds", "Restaurants"),
    ("wendys", "Restaurants"),
    ("kfc", "Restaurants"),
    ("burger king", "Restaurants"),
    ("dunkin", "Restaurants"),
    ("wolt", "Restaurants"),
    ("glovo", "Restaurants"),
    // Transportation
    ("uber", "Transportation"),
    ("bolt", "Transportation"),
    ("yandex go", "Transportation"),
    ("tbilisi metro", "Transportation"),
    ("bus tbilisi", "Transportation"),
    ("minibus tbilisi", "Transportation"),
    ("shell", "Transportation"),
    // Clothes
    ("hm", "Clothes"),
    ("zara", "Clothes"),
    ("lc waikiki", "Clothes"),
    ("defacto", "Clothes"),
    // Technology
    ("apple", "Technology"),
    ("zoommer", "Technology"),
    ("alta", "Technology"),
    // Furniture
    ("ikea", "Furniture"),
    ("jysk", "Furniture"),
    // Subscriptions
    ("netflix", "Subscriptions"),
    ("spotify", "Subscriptions"),
    ("youtube premium", "Subscriptions"),
    ("icloud", "Subscriptions"),
    ("chatgpt", "Subscriptions"),
    // Utilities
    ("telmiko", "Electricity Bill"),
    ("tbilisi energy", "Electricity Bill"),
    ("gwp", "Water Bill"),
    ("tbilservice group", "Elevator & Cleaning Bill"),
    ("magti", "Mobile Data"),
    ("silknet", "Home Internet"),
    // Fitness
    ("fitpass", "Fitness"),
];
