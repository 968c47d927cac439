//! Thread-safe balance storage with per-user locking
//!
//! This module provides the `BalanceStore` struct, which owns every
//! (user, currency) balance in the process.
//!
//! # Design
//!
//! Each user's balances live in one [`Wallet`] behind its own `Mutex`. The
//! mutexes are kept in a `DashMap` keyed by user id, so:
//! - operations on different users proceed in parallel
//! - operations on the same user are serialized by that user's mutex
//! - two-user operations lock both wallets in ascending user-id order,
//!   which rules out lock-order deadlocks between opposing transfers
//!
//! The DashMap shard lock is only held long enough to clone the `Arc` of a
//! wallet slot, never while a closure runs. Holding two DashMap entry guards
//! at once can deadlock when both keys hash to the same shard.

use crate::types::{BalanceRow, Currency, UserId, Wallet, WalletError};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, MutexGuard};

type WalletSlot = Arc<Mutex<Wallet>>;

/// Balance keyspace `(user_id, currency) -> amount`
#[derive(Debug, Default)]
pub struct BalanceStore {
    wallets: DashMap<UserId, WalletSlot>,
}

impl BalanceStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            wallets: DashMap::new(),
        }
    }

    fn slot(&self, user: UserId) -> WalletSlot {
        Arc::clone(
            self.wallets
                .entry(user)
                .or_insert_with(|| Arc::new(Mutex::new(Wallet::new(user))))
                .value(),
        )
    }

    fn lock(slot: &Mutex<Wallet>) -> Result<MutexGuard<'_, Wallet>, WalletError> {
        slot.lock()
            .map_err(|_| WalletError::persistence("wallet lock poisoned"))
    }

    /// Read one balance
    ///
    /// Returns zero when the user or the currency row doesn't exist. Reading
    /// never creates a row.
    pub fn get_balance(&self, user: UserId, currency: Currency) -> Result<Decimal, WalletError> {
        let Some(slot) = self.wallets.get(&user).map(|entry| Arc::clone(entry.value())) else {
            return Ok(Decimal::ZERO);
        };
        let wallet = Self::lock(&slot)?;
        Ok(wallet.balance(currency))
    }

    /// All materialized balance rows for one user
    pub fn balances(&self, user: UserId) -> Result<Vec<BalanceRow>, WalletError> {
        let Some(slot) = self.wallets.get(&user).map(|entry| Arc::clone(entry.value())) else {
            return Ok(Vec::new());
        };
        let wallet = Self::lock(&slot)?;
        Ok(wallet.rows())
    }

    /// Add `delta` to a balance, creating the row at zero if absent
    ///
    /// # Errors
    ///
    /// * `InsufficientFunds` - the committed balance would become negative
    /// * `ArithmeticOverflow` - the sum does not fit in a `Decimal`
    pub fn adjust_balance(
        &self,
        user: UserId,
        currency: Currency,
        delta: Decimal,
    ) -> Result<Decimal, WalletError> {
        self.update(user, |wallet| wallet.adjust(currency, delta))
    }

    /// Run `f` with exclusive access to one user's wallet
    ///
    /// The wallet is created empty if the user has none yet. Other operations
    /// on this user block until `f` returns.
    pub fn update<F, T>(&self, user: UserId, f: F) -> Result<T, WalletError>
    where
        F: FnOnce(&mut Wallet) -> Result<T, WalletError>,
    {
        let slot = self.slot(user);
        let mut wallet = Self::lock(&slot)?;
        f(&mut wallet)
    }

    /// Run `f` with exclusive access to two distinct users' wallets
    ///
    /// Locks are always taken in ascending user-id order, regardless of the
    /// argument order. `f` receives the wallets in argument order.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `first == second`.
    pub fn update_pair<F, T>(&self, first: UserId, second: UserId, f: F) -> Result<T, WalletError>
    where
        F: FnOnce(&mut Wallet, &mut Wallet) -> Result<T, WalletError>,
    {
        if first == second {
            return Err(WalletError::validation(
                "a two-wallet operation needs two distinct users",
            ));
        }

        let first_slot = self.slot(first);
        let second_slot = self.slot(second);

        if first < second {
            let mut a = Self::lock(&first_slot)?;
            let mut b = Self::lock(&second_slot)?;
            f(&mut a, &mut b)
        } else {
            let mut b = Self::lock(&second_slot)?;
            let mut a = Self::lock(&first_slot)?;
            f(&mut a, &mut b)
        }
    }

    /// Snapshot of every materialized row across all users
    ///
    /// Rows are returned in arbitrary user order.
    pub fn snapshot(&self) -> Result<Vec<BalanceRow>, WalletError> {
        let slots: Vec<WalletSlot> = self
            .wallets
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut rows = Vec::new();
        for slot in slots {
            rows.extend(Self::lock(&slot)?.rows());
        }
        Ok(rows)
    }
}
