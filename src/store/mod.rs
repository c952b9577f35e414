//! Persistent store for the three threat-intel collections and the update cursor.
//!
//! The store is the only owner of entity state. Every multi-row operation is a
//! single batch per category: it either commits fully or not at all.

mod memory;
mod postgres;

use anyhow::Result;
use async_trait::async_trait;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::model::{Category, Cursor};

/// Rows actually changed by one category batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounts {
    pub removed: u64,
    pub inserted: u64,
}

#[cfg(test)]
use mockall::automock;

/// Trait for store backends
///
/// `list` and `list_ips` return values in lexical byte order, which keeps the
/// compiled ruleset independent of insertion history.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Create tables if they do not exist yet
    async fn migrate(&self) -> Result<()>;

    /// All values of a category, in lexical order
    async fn list(&self, category: Category) -> Result<Vec<String>>;

    /// Full IP blacklist, in lexical order
    async fn list_ips(&self) -> Result<Vec<String>>;

    /// Number of values stored for a category
    async fn count(&self, category: Category) -> Result<u64>;

    /// Insert values, silently skipping those already present.
    /// Returns the number of rows actually inserted.
    async fn insert_many(&self, category: Category, values: &[String]) -> Result<u64>;

    /// Delete values. Returns the number of rows actually removed.
    async fn delete_many(&self, category: Category, values: &[String]) -> Result<u64>;

    /// Delete `to_remove`, then insert `to_insert`, as one transaction.
    ///
    /// On error nothing of the batch is committed and the category is left
    /// as it was.
    async fn apply_batch(
        &self,
        category: Category,
        to_remove: &[String],
        to_insert: &[String],
    ) -> Result<BatchCounts>;

    /// Most recent cursor, `None` before the first successful sync
    async fn read_cursor(&self) -> Result<Option<Cursor>>;

    /// Record a new cursor value
    async fn advance_cursor(&self, now: Cursor) -> Result<()>;
}
