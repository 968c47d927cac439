//! In-memory transaction ledger
//!
//! Entries are kept in append order in a single `Vec` behind an `RwLock`,
//! with an id index for lookups. A batch append takes the write lock once,
//! so the rows of one operation (the `send`/`receive` pair of a transfer)
//! land together or not at all.

use super::traits::Ledger;
use crate::types::{LedgerEntry, TransactionId, UserId, WalletError};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard};

#[derive(Debug, Default)]
struct Entries {
    rows: Vec<LedgerEntry>,
    index: HashMap<TransactionId, usize>,
}

/// Process-local [`Ledger`] implementation
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    entries: RwLock<Entries>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Entries>, WalletError> {
        self.entries
            .read()
            .map_err(|_| WalletError::persistence("ledger lock poisoned"))
    }
}

impl Ledger for InMemoryLedger {
    fn append(&self, entries: Vec<LedgerEntry>) -> Result<Vec<TransactionId>, WalletError> {
        let mut stored = self
            .entries
            .write()
            .map_err(|_| WalletError::persistence("ledger lock poisoned"))?;

        // Ids must be new to the ledger and unique within the batch
        let mut seen = Vec::with_capacity(entries.len());
        for entry in &entries {
            if stored.index.contains_key(&entry.id) || seen.contains(&entry.id) {
                return Err(WalletError::persistence(format!(
                    "ledger entry {} already exists",
                    entry.id
                )));
            }
            seen.push(entry.id);
        }

        for entry in entries {
            let position = stored.rows.len();
            stored.index.insert(entry.id, position);
            stored.rows.push(entry);
        }
        Ok(seen)
    }

    fn get(&self, id: TransactionId) -> Result<Option<LedgerEntry>, WalletError> {
        let stored = self.read()?;
        Ok(stored.index.get(&id).map(|&position| stored.rows[position].clone()))
    }

    fn history(&self, user: UserId, limit: usize) -> Result<Vec<LedgerEntry>, WalletError> {
        Ok(self
            .read()?
            .rows
            .iter()
            .rev()
            .filter(|entry| entry.user_id == user)
            .take(limit)
            .cloned()
            .collect())
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>, WalletError> {
        Ok(self.read()?.rows.clone())
    }
}
