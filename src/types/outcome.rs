//! API-shaped result of a wallet operation

use super::currency::Currency;
use super::error::WalletError;
use super::transaction::{LedgerEntry, TransactionId};
use rust_decimal::Decimal;
use serde::Serialize;

/// `{success, transaction_id?, amount, currency, error?}`
///
/// This is what an HTTP layer would return for charge, withdraw, transfer
/// and exchange. The replay binary writes one of these per input row when
/// `--outcomes` is given.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationOutcome {
    /// Outcome for a committed (or pending) ledger entry
    pub fn succeeded(entry: &LedgerEntry) -> Self {
        OperationOutcome {
            success: true,
            transaction_id: Some(entry.id),
            amount: Some(entry.amount),
            currency: Some(entry.currency),
            error: None,
        }
    }

    /// Outcome for an operation that succeeds without a ledger entry, such
    /// as registration
    pub fn accepted() -> Self {
        OperationOutcome {
            success: true,
            transaction_id: None,
            amount: None,
            currency: None,
            error: None,
        }
    }

    /// Outcome for a rejected operation
    pub fn failed(error: &WalletError) -> Self {
        OperationOutcome {
            success: false,
            transaction_id: None,
            amount: None,
            currency: None,
            error: Some(error.to_string()),
        }
    }
}

impl From<&Result<LedgerEntry, WalletError>> for OperationOutcome {
    fn from(result: &Result<LedgerEntry, WalletError>) -> Self {
        match result {
            Ok(entry) => OperationOutcome::succeeded(entry),
            Err(error) => OperationOutcome::failed(error),
        }
    }
}

impl From<&Result<Option<LedgerEntry>, WalletError>> for OperationOutcome {
    fn from(result: &Result<Option<LedgerEntry>, WalletError>) -> Self {
        match result {
            Ok(Some(entry)) => OperationOutcome::succeeded(entry),
            Ok(None) => OperationOutcome::accepted(),
            Err(error) => OperationOutcome::failed(error),
        }
    }
}
