//! Inventory ledger: transactional check-and-reserve over persisted stock.
//!
//! Reservation is all-or-nothing: either every requested item is available
//! and every quantity is deducted in one transaction, or nothing is mutated
//! and the first deficient item is reported. Credit is the reverse operation,
//! used both for restock and for compensating a timed-out reservation.

use std::collections::BTreeMap;

use async_trait::async_trait;

pub mod schema;
mod sqlite;

pub use sqlite::SqliteLedger;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur during ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Stock check failed; names the first deficient item. Nothing was
    /// mutated.
    #[error("Insufficient inventory: {item} (need {requested}, have {available})")]
    Insufficient {
        item: String,
        requested: u32,
        available: i64,
    },

    #[error("inventory database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Transactional stock operations.
///
/// Item maps are ordered by name so failure reporting is deterministic.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Check that every item has sufficient stock and deduct all requested
    /// quantities atomically. On `Insufficient` no quantity is touched.
    async fn reserve(&self, items: &BTreeMap<String, u32>) -> Result<()>;

    /// Add quantities back to stock: restock finalization or reservation
    /// compensation. Items the ledger has never seen are skipped.
    async fn credit(&self, items: &BTreeMap<String, u32>) -> Result<()>;

    /// Current stock level for one item, if it exists.
    async fn quantity(&self, item: &str) -> Result<Option<i64>>;
}
