//! Error types for the wallet engine
//!
//! This module defines every error a wallet operation, the rate provider or
//! the replay surface can produce. Messages are written for CLI and API
//! consumers alike.
//!
//! # Error Categories
//!
//! - **File I/O Errors**: File not found, permission denied, etc.
//! - **CSV Parsing Errors**: Malformed rows, unknown operation types, etc.
//! - **Precondition Errors**: Validation, insufficient funds, unknown recipient,
//!   unsupported currency or pair. These never mutate state.
//! - **Persistence Errors**: The ledger or a wallet lock could not be used
//! - **Rate Errors**: A rate source failed. The provider recovers from these
//!   locally and never hands them to wallet callers.

use super::currency::Currency;
use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the wallet engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WalletError {
    /// File not found at the specified path
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was not found
        path: String,
    },

    /// I/O error occurred while reading or writing files
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O error
        message: String,
    },

    /// CSV parsing error occurred
    ///
    /// This is a recoverable error - the malformed row is skipped
    /// and replay continues with the next one.
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },

    /// Invalid operation type encountered in the replay input
    #[error("Invalid operation type '{op_type}'")]
    InvalidOperationType {
        /// The invalid operation type string
        op_type: String,
    },

    /// Missing or malformed caller input
    ///
    /// Reported before any lock is taken; no state is touched.
    #[error("Validation failed: {message}")]
    Validation {
        /// What was wrong with the input
        message: String,
    },

    /// Currency code outside USD/USDT/IRR
    #[error("Unsupported currency '{code}'")]
    UnsupportedCurrency {
        /// The rejected code, as supplied
        code: String,
    },

    /// Balance too low for the requested debit
    #[error("Insufficient {currency} balance: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Currency of the balance that was checked
        currency: Currency,
        /// Balance at the time of the check
        available: Decimal,
        /// Amount the operation needed (fees included)
        requested: Decimal,
    },

    /// Transfer recipient handle is not registered
    #[error("Recipient '{handle}' not found")]
    RecipientNotFound {
        /// Handle that failed to resolve
        handle: String,
    },

    /// No rate exists for the requested pair
    #[error("Unsupported currency pair {from}->{to}")]
    UnsupportedCurrencyPair {
        /// Source currency
        from: Currency,
        /// Target currency
        to: Currency,
    },

    /// Unexpected storage failure
    ///
    /// The operation is recorded as `failed` in the ledger where a row can
    /// still be written.
    #[error("Persistence failure: {message}")]
    PersistenceFailure {
        /// Description of the storage failure
        message: String,
    },

    /// A rate source could not produce a usable quote
    #[error("Rate source '{source_name}' unavailable: {message}")]
    RateProviderUnavailable {
        /// Name of the failing source
        source_name: String,
        /// Why the source failed
        message: String,
    },

    /// Arithmetic overflow would occur
    #[error("Arithmetic overflow in {operation}")]
    ArithmeticOverflow {
        /// Operation that would overflow
        operation: String,
    },

    /// Handle is already taken
    #[error("User '{handle}' is already registered")]
    DuplicateUser {
        /// The duplicated handle
        handle: String,
    },

    /// No user with this identifier or handle
    #[error("User '{user}' not found")]
    UserNotFound {
        /// Identifier or handle that was looked up
        user: String,
    },

    /// Handle and password do not match
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Operation never ran to completion, so its effect is unknown
    #[error("Operation aborted: {message}")]
    Aborted {
        /// What stopped it
        message: String,
    },

    /// Configuration value could not be parsed
    #[error("Invalid configuration for {key}: {message}")]
    Config {
        /// Setting name (environment variable or flag)
        key: String,
        /// Why the value was rejected
        message: String,
    },
}

// Conversion from io::Error to WalletError
impl From<std::io::Error> for WalletError {
    fn from(error: std::io::Error) -> Self {
        WalletError::IoError {
            message: error.to_string(),
        }
    }
}

// Conversion from csv::Error to WalletError
impl From<csv::Error> for WalletError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        WalletError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl WalletError {
    /// Create a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        WalletError::Validation {
            message: message.into(),
        }
    }

    /// Create an UnsupportedCurrency error
    pub fn unsupported_currency(code: &str) -> Self {
        WalletError::UnsupportedCurrency {
            code: code.to_string(),
        }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(currency: Currency, available: Decimal, requested: Decimal) -> Self {
        WalletError::InsufficientFunds {
            currency,
            available,
            requested,
        }
    }

    /// Create a RecipientNotFound error
    pub fn recipient_not_found(handle: &str) -> Self {
        WalletError::RecipientNotFound {
            handle: handle.to_string(),
        }
    }

    /// Create an UnsupportedCurrencyPair error
    pub fn unsupported_pair(from: Currency, to: Currency) -> Self {
        WalletError::UnsupportedCurrencyPair { from, to }
    }

    /// Create a PersistenceFailure error
    pub fn persistence(message: impl Into<String>) -> Self {
        WalletError::PersistenceFailure {
            message: message.into(),
        }
    }

    /// Create a RateProviderUnavailable error
    pub fn rate_unavailable(source_name: &str, message: impl Into<String>) -> Self {
        WalletError::RateProviderUnavailable {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str) -> Self {
        WalletError::ArithmeticOverflow {
            operation: operation.to_string(),
        }
    }

    /// Create a DuplicateUser error
    pub fn duplicate_user(handle: &str) -> Self {
        WalletError::DuplicateUser {
            handle: handle.to_string(),
        }
    }

    /// Create a UserNotFound error
    pub fn user_not_found(user: impl ToString) -> Self {
        WalletError::UserNotFound {
            user: user.to_string(),
        }
    }

    /// Create a Config error
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        WalletError::Config {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Create an Aborted error
    pub fn aborted(message: impl Into<String>) -> Self {
        WalletError::Aborted {
            message: message.into(),
        }
    }

    /// Create an InvalidOperationType error
    pub fn invalid_operation_type(op_type: &str) -> Self {
        WalletError::InvalidOperationType {
            op_type: op_type.to_string(),
        }
    }
}
