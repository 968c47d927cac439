//! Core business logic module
//!
//! This module contains the wallet components:
//! - `traits` - The [`Ledger`] abstraction
//! - `users` - User registration, lookup and credential checks
//! - `balance_store` - Per-user balances behind per-user locks
//! - `ledger` - In-memory append-only transaction ledger
//! - `wallet` - Charge, withdraw, transfer and exchange
//! - `engine` - Replays parsed operation records onto the wallet
//! - `batch_processor` - Concurrent replay of independent user groups

pub mod balance_store;
pub mod batch_processor;
pub mod engine;
pub mod ledger;
pub mod traits;
pub mod users;
pub mod wallet;

pub use balance_store::BalanceStore;
pub use batch_processor::BatchProcessor;
pub use engine::{HandleBalance, ProcessingResult, ReplayEngine};
pub use ledger::InMemoryLedger;
pub use traits::Ledger;
pub use users::UserDirectory;
pub use wallet::{PaymentMethod, WalletOperations};
