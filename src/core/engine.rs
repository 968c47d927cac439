//! Replay engine
//!
//! Routes parsed [`OperationRecord`]s onto [`WalletOperations`]. The input
//! identifies users by handle, so the engine resolves handles first and
//! opens an account for any acting handle it has not seen before. Transfer
//! recipients are never created implicitly.

use super::wallet::{PaymentMethod, WalletOperations};
use crate::types::{Currency, LedgerEntry, Operation, OperationOutcome, OperationRecord, WalletError};
use rust_decimal::Decimal;

/// Result of processing a single record
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// The record that was processed
    pub record: OperationRecord,

    /// The committed entry, `None` for operations that write no ledger row
    pub result: Result<Option<LedgerEntry>, WalletError>,
}

impl ProcessingResult {
    pub fn outcome(&self) -> OperationOutcome {
        OperationOutcome::from(&self.result)
    }
}

/// One line of the final balance report
#[derive(Debug, Clone, PartialEq)]
pub struct HandleBalance {
    pub handle: String,
    pub currency: Currency,
    pub amount: Decimal,
}

/// Applies replayed operations to a wallet core
///
/// Cloning is cheap and clones share state, so one engine can be handed to
/// many worker tasks.
#[derive(Debug, Clone)]
pub struct ReplayEngine {
    wallet: WalletOperations,
}

impl ReplayEngine {
    pub fn new(wallet: WalletOperations) -> Self {
        ReplayEngine { wallet }
    }

    pub fn wallet(&self) -> &WalletOperations {
        &self.wallet
    }

    /// Process a single record
    ///
    /// # Errors
    ///
    /// Whatever the wallet operation returns. `register` rows for a handle
    /// that already exists fail with `DuplicateUser`.
    pub fn process(&self, record: &OperationRecord) -> Result<Option<LedgerEntry>, WalletError> {
        if let Operation::Register { password } = &record.operation {
            self.wallet
                .register(&record.user, password.as_deref())?;
            return Ok(None);
        }

        let user = self.wallet.users().ensure(&record.user)?;

        let entry = match &record.operation {
            Operation::Register { .. } => return Ok(None),
            Operation::Charge {
                amount,
                currency,
                card_data,
            } => self.wallet.charge(
                user.id,
                *amount,
                *currency,
                PaymentMethod::default_for(*currency),
                card_data.as_deref(),
            )?,
            Operation::Withdraw {
                amount,
                currency,
                destination,
            } => self.wallet.withdraw(user.id, *amount, *currency, destination)?,
            Operation::Transfer {
                amount,
                currency,
                recipient,
                message,
            } => self
                .wallet
                .transfer(user.id, recipient, *amount, *currency, message.as_deref())?,
            Operation::Exchange { amount, from, to } => {
                self.wallet.exchange(user.id, *from, *to, *amount)?
            }
        };

        Ok(Some(entry))
    }

    /// Process a record and keep it next to its result
    pub fn process_record(&self, record: OperationRecord) -> ProcessingResult {
        let result = self.process(&record);
        if let Err(error) = &result {
            tracing::warn!(
                line = record.line,
                user = %record.user,
                operation = record.operation.name(),
                error = %error,
                "operation rejected"
            );
        }
        ProcessingResult { record, result }
    }

    /// Every materialized balance, keyed by handle, sorted by handle then
    /// currency
    pub fn balance_report(&self) -> Result<Vec<HandleBalance>, WalletError> {
        let mut report = Vec::new();
        for row in self.wallet.all_balances()? {
            let user = self
                .wallet
                .users()
                .get(row.user)
                .ok_or_else(|| WalletError::user_not_found(row.user))?;
            report.push(HandleBalance {
                handle: user.handle,
                currency: row.currency,
                amount: row.amount,
            });
        }
        report.sort_by(|a, b| {
            a.handle
                .cmp(&b.handle)
                .then_with(|| a.currency.cmp(&b.currency))
        });
        Ok(report)
    }
}
