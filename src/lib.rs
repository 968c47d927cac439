//! Multi-currency wallet engine
//!
//! # Overview
//!
//! Wallets hold balances in USD, USDT and IRR. Users can charge (fund) a
//! wallet, withdraw to a card, transfer to another user, and exchange
//! between currencies at a cached USD/IRR rate. Every balance change is
//! recorded in an append-only ledger in the same critical section that
//! changes the balance.
//!
//! # Architecture
//!
//! - [`types`] - Currencies, wallets, ledger entries, errors
//! - [`rates`] - Rate sources and the TTL-cached [`rates::RateProvider`]
//! - [`core`] - Business logic:
//!   - [`core::users`] - Registration and credential checks
//!   - [`core::balance_store`] - Per-user locked balances
//!   - [`core::ledger`] - Append-only transaction ledger
//!   - [`core::wallet`] - Charge, withdraw, transfer, exchange
//!   - [`core::engine`] / [`core::batch_processor`] - Replay of operation files
//! - [`io`] - CSV input, balance/ledger CSV output, JSON outcome reports
//! - [`strategy`] - Sync and async replay pipelines
//! - [`config`], [`logging`], [`cli`] - Process setup
//!
//! # Rates
//!
//! USD and USDT are pinned 1:1. USD/IRR comes from the configured sources,
//! is cached for five minutes, must fall strictly between 500,000 and
//! 2,000,000, and falls back to the last good value or to 1,070,000.

pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod logging;
pub mod rates;
pub mod strategy;
pub mod types;

pub use crate::config::WalletConfig;
pub use crate::core::{
    BalanceStore, InMemoryLedger, Ledger, PaymentMethod, ReplayEngine, UserDirectory,
    WalletOperations,
};
pub use rates::{RateProvider, RateQuote};
pub use types::{
    Currency, LedgerEntry, OperationOutcome, TransactionId, TransactionKind, TransactionStatus,
    User, UserId, WalletError,
};
