//! Durable resource records that outlive a single plugin process.

pub mod sqlite;
pub mod store;

pub use sqlite::SqliteResourceStore;
pub use store::ResourceStore;
