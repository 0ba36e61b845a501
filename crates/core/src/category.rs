use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub i64);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryType {
    Income,
    Expense,
    Either,
}

impl fmt::Display for CategoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryType::Income => write!(f, "income"),
            CategoryType::Expense => write!(f, "expense"),
            CategoryType::Either => write!(f, "either"),
        }
    }
}

impl std::str::FromStr for CategoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" => Ok(CategoryType::Income),
            "expense" => Ok(CategoryType::Expense),
            "either" | "" => Ok(CategoryType::Either),
            other => Err(format!("Unknown category type: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub category_type: CategoryType,
}

impl Category {
    pub fn new(id: i64, name: &str, category_type: CategoryType) -> Self {
        Category {
            id: CategoryId(id),
            name: name.to_string(),
            category_type,
        }
    }
}

/// Loose spellings of category names, mapped to the canonical lowercase name.
pub const CATEGORY_ALIASES: &[(&str, &str)] = &[
    ("transport", "transportation"),
    ("grocery", "groceries"),
    ("restaurant", "restaurants"),
    ("subscription", "subscriptions"),
    ("clothing", "clothes"),
    ("misc", "other"),
];

/// Canonical lowercase form of a category name, after alias mapping.
pub fn canonical_category_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    CATEGORY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(lowered)
}

/// Immutable name/id lookup over the categories known for one import.
#[derive(Debug, Clone, Default)]
pub struct CategoryIndex {
    by_id: HashMap<CategoryId, Category>,
    by_name: HashMap<String, CategoryId>,
}

impl CategoryIndex {
    pub fn new(categories: Vec<Category>) -> Self {
        let mut index = CategoryIndex::default();
        for category in categories {
            index
                .by_name
                .entry(category.name.trim().to_lowercase())
                .or_insert(category.id);
            index.by_id.insert(category.id, category);
        }
        index
    }

    /// Case-insensitive lookup with the alias table applied.
    pub fn find_by_name(&self, name: &str) -> Option<&Category> {
        let canonical = canonical_category_name(name);
        self.by_name
            .get(&canonical)
            .or_else(|| self.by_name.get(&name.trim().to_lowercase()))
            .and_then(|id| self.by_id.get(id))
    }

    pub fn get(&self, id: CategoryId) -> Option<&Category> {
        self.by_id.get(&id)
    }

    pub fn contains(&self, id: CategoryId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

pub const DEFAULT_CATEGORIES: &[(&str, CategoryType)] = &[
    ("Groceries", CategoryType::Expense),
    ("Restaurants", CategoryType::Expense),
    ("Entertainment", CategoryType::Expense),
    ("Technology", CategoryType::Expense),
    ("Furniture", CategoryType::Expense),
    ("Clothes", CategoryType::Expense),
    ("Transportation", CategoryType::Expense),
    ("Rent", CategoryType::Expense),
    ("Home Internet", CategoryType::Expense),
    ("Mobile Data", CategoryType::Expense),
    ("Electricity Bill", CategoryType::Expense),
    ("Water Bill", CategoryType::Expense),
    ("Heating Bill", CategoryType::Expense),
    ("Elevator & Cleaning Bill", CategoryType::Expense),
    ("Subscriptions", CategoryType::Expense),
    ("Taxes", CategoryType::Expense),
    ("Fitness", CategoryType::Expense),
    ("Other", CategoryType::Either),
    ("Gifts", CategoryType::Either),
    ("Transfers", CategoryType::Either),
    ("Salary", CategoryType::Income),
    ("Freelance", CategoryType::Income),
    ("Investment Returns", CategoryType::Income),
    ("Refunds", CategoryType::Income),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> CategoryIndex {
        CategoryIndex::new(vec![
            Category::new(1, "Transportation", CategoryType::Expense),
            Category::new(2, "Other", CategoryType::Either),
            Category::new(3, "Groceries", CategoryType::Expense),
        ])
    }

    #[test]
    fn find_by_name_is_case_insensitive() {
        let idx = index();
        assert_eq!(idx.find_by_name("OTHER").unwrap().id, CategoryId(2));
        assert_eq!(idx.find_by_name("  groceries ").unwrap().id, CategoryId(3));
    }

    #[test]
    fn find_by_name_applies_aliases() {
        let idx = index();
        assert_eq!(idx.find_by_name("Transport").unwrap().id, CategoryId(1));
        assert_eq!(idx.find_by_name("grocery").unwrap().id, CategoryId(3));
        assert_eq!(idx.find_by_name("misc").unwrap().id, CategoryId(2));
    }

    #[test]
    fn unknown_name_is_none() {
        assert!(index().find_by_name("Yachts").is_none());
    }

    #[test]
    fn category_type_parse() {
        use std::str::FromStr;
        assert_eq!(CategoryType::from_str("Income").unwrap(), CategoryType::Income);
        assert_eq!(CategoryType::from_str("").unwrap(), CategoryType::Either);
        assert!(CategoryType::from_str("asset").is_err());
    }

    #[test]
    fn default_categories_include_other() {
        assert!(DEFAULT_CATEGORIES.iter().any(|(n, _)| *n == "Other"));
    }
}
