//! Murmur Store
//!
//! SQLite persistence for confessions, users, and the tip ledger.
//!
//! The tip ledger is the source of truth: one row per verified payment,
//! keyed by a unique transaction hash. The per-confession and per-user
//! counters are derived projections; they are only ever written through the
//! single-statement atomic increments here or by the reconciliation updates
//! that recompute them from the ledger.

mod models;
mod sqlite;

pub use models::{Confession, ConfessionSnapshot, TipRecord, User};
pub use sqlite::TipStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A tip with this transaction hash already exists. The unique
    /// constraint is the idempotency gate; racing inserts lose here.
    #[error("duplicate transaction reference")]
    DuplicateReference,
    /// An increment targeted a row that does not exist. Callers guarantee
    /// row existence beforehand, so this is a logic error.
    #[error("row not found: {0}")]
    MissingRow(String),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}
