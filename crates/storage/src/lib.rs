pub mod db;
pub mod store;

pub use db::{create_db, seed_defaults, DbPool};
pub use store::SqliteStore;
