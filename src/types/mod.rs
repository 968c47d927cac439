//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `currency`: Supported currencies and precision rules
//! - `balance`: Per-user wallet balances
//! - `transaction`: Ledger entries, identifiers and replay operations
//! - `user`: Registered users
//! - `outcome`: API-shaped operation results
//! - `error`: Error types for the wallet engine

pub mod balance;
pub mod currency;
pub mod error;
pub mod outcome;
pub mod transaction;
pub mod user;

pub use balance::{BalanceRow, Wallet};
pub use currency::Currency;
pub use error::WalletError;
pub use outcome::OperationOutcome;
pub use transaction::{
    LedgerEntry, Operation, OperationRecord, TransactionId, TransactionKind, TransactionStatus,
    UserId,
};
pub use user::User;
