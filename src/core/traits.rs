//! Core traits for the wallet engine
//!
//! The ledger sits behind a trait so the in-memory implementation can be
//! swapped for a durable store (or a failing one in tests) without touching
//! the wallet operations.

use crate::types::{LedgerEntry, TransactionId, UserId, WalletError};
use std::fmt::Debug;

/// Append-only transaction history
///
/// Implementations must be safe to share across threads.
pub trait Ledger: Debug + Send + Sync {
    /// Append entries atomically: either every entry is stored or none is
    ///
    /// Returns the ids of the stored entries in input order.
    fn append(&self, entries: Vec<LedgerEntry>) -> Result<Vec<TransactionId>, WalletError>;

    /// Look up a single entry
    fn get(&self, id: TransactionId) -> Result<Option<LedgerEntry>, WalletError>;

    /// Entries owned by `user`, newest first, at most `limit` of them
    fn history(&self, user: UserId, limit: usize) -> Result<Vec<LedgerEntry>, WalletError>;

    /// Every entry in append order
    fn entries(&self) -> Result<Vec<LedgerEntry>, WalletError>;
}
