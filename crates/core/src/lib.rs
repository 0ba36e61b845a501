pub mod category;
pub mod config;
pub mod currency;
pub mod memory;
pub mod money;
pub mod pattern;
pub mod store;
pub mod transaction;

pub use category::{Category, CategoryId, CategoryIndex, CategoryType, DEFAULT_CATEGORIES};
pub use config::{ConfigError, FxConfig, MatchingConfig, StorageConfig, TallyConfig};
pub use currency::{Currency, CurrencyCatalog, CurrencyId, ExchangeRate, DEFAULT_CURRENCIES};
pub use memory::MemoryStore;
pub use money::Money;
pub use pattern::{MerchantPattern, PatternScope, UserId, DEFAULT_MERCHANTS};
pub use store::{
    CategoryStore, CurrencyStore, PatternStore, RateStore, StoreError, TransactionStore,
};
pub use transaction::{
    parse_transaction_date, ExplicitCategory, RawTransactionCandidate, ResolvedTransaction,
    TransactionType,
};
