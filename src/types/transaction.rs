//! Ledger and operation types for the wallet engine
//!
//! This module defines the immutable ledger entry written for every
//! mutating operation attempt, plus the operation records the replay
//! surface feeds into the wallet core.

use super::currency::Currency;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// User identifier (UUID v4, assigned at registration)
pub type UserId = Uuid;

/// Ledger entry identifier (UUID v4)
pub type TransactionId = Uuid;

/// Kind of ledger entry
///
/// A transfer produces two entries: `Send` for the sender and `Receive`
/// for the recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Funds added from an external payment method
    Charge,
    /// Funds paid out to a card
    Withdraw,
    /// Sender side of a transfer
    Send,
    /// Recipient side of a transfer
    Receive,
    /// Conversion between two of the user's own balances
    Exchange,
}

impl TransactionKind {
    /// Lowercase wire name
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Charge => "charge",
            TransactionKind::Withdraw => "withdraw",
            TransactionKind::Send => "send",
            TransactionKind::Receive => "receive",
            TransactionKind::Exchange => "exchange",
        }
    }
}

/// Terminal state of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Accepted but not yet settled externally (fee-inclusive withdrawals)
    Pending,
    /// Balances were mutated and the operation is final
    Completed,
    /// The attempt failed; no balance was mutated
    Failed,
}

impl TransactionStatus {
    /// Lowercase wire name
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }
}

/// Immutable record of one operation attempt
///
/// Entries are never updated or deleted once appended to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry id
    pub id: TransactionId,

    /// Owner of the entry
    pub user_id: UserId,

    /// Operation type
    #[serde(rename = "type")]
    pub kind: TransactionKind,

    /// Amount in `currency`
    ///
    /// For exchanges this is the debited source amount; the credited
    /// amount lives in the metadata as `final_amount`.
    pub amount: Decimal,

    /// Currency of `amount`
    pub currency: Currency,

    /// Source currency (exchange only)
    pub from_currency: Option<Currency>,

    /// Target currency (exchange only)
    pub to_currency: Option<Currency>,

    pub status: TransactionStatus,

    /// Human-readable summary
    pub description: String,

    /// Operation-specific details (payment method, fee, counterparty, ...)
    pub metadata: Value,

    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Build a new entry stamped with a fresh id and the current time
    pub fn new(
        user_id: UserId,
        kind: TransactionKind,
        amount: Decimal,
        currency: Currency,
        status: TransactionStatus,
        description: impl Into<String>,
        metadata: Value,
    ) -> Self {
        LedgerEntry {
            id: Uuid::new_v4(),
            user_id,
            kind,
            amount,
            currency,
            from_currency: None,
            to_currency: None,
            status,
            description: description.into(),
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Attach the exchange leg currencies
    pub fn with_pair(mut self, from: Currency, to: Currency) -> Self {
        self.from_currency = Some(from);
        self.to_currency = Some(to);
        self
    }

    /// Copy of this entry with status `failed` and the error in metadata
    ///
    /// Used when the completed entry could not be persisted.
    pub fn into_failed(self, error: &str) -> Self {
        LedgerEntry {
            id: Uuid::new_v4(),
            status: TransactionStatus::Failed,
            description: format!("Failed {} attempt - {}", self.kind.as_str(), self.currency),
            metadata: serde_json::json!({ "error": error }),
            created_at: Utc::now(),
            ..self
        }
    }
}

/// One typed wallet operation, as read from the replay input
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Register {
        password: Option<String>,
    },
    Charge {
        amount: Decimal,
        currency: Currency,
        card_data: Option<String>,
    },
    Withdraw {
        amount: Decimal,
        currency: Currency,
        destination: String,
    },
    Transfer {
        amount: Decimal,
        currency: Currency,
        recipient: String,
        message: Option<String>,
    },
    Exchange {
        amount: Decimal,
        from: Currency,
        to: Currency,
    },
}

impl Operation {
    /// Lowercase operation name as it appears in the input
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Register { .. } => "register",
            Operation::Charge { .. } => "charge",
            Operation::Withdraw { .. } => "withdraw",
            Operation::Transfer { .. } => "transfer",
            Operation::Exchange { .. } => "exchange",
        }
    }
}

/// Input operation record from CSV
///
/// Users are identified by handle; the replay layer resolves (and if
/// needed registers) the handle before calling into the wallet core.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRecord {
    /// 1-based position in the input, used to keep log lines traceable
    pub line: u64,

    /// Handle of the acting user
    pub user: String,

    pub operation: Operation,
}

impl OperationRecord {
    /// Handles this record touches: the acting user and, for transfers,
    /// the recipient
    pub fn handles(&self) -> impl Iterator<Item = &str> {
        let recipient = match &self.operation {
            Operation::Transfer { recipient, .. } => Some(recipient.as_str()),
            _ => None,
        };
        std::iter::once(self.user.as_str()).chain(recipient)
    }
}
