//! CSV format handling for operation records, balances and the ledger
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvRecord structure for deserialization
//! - Conversion from CSV records to domain types
//! - Balance report and ledger serialization
//!
//! All functions are pure (no file handling) for easy testing.
//!
//! # Input columns
//!
//! `type,user,currency,amount,target,reference`
//!
//! | type       | currency | amount | target           | reference      |
//! |------------|----------|--------|------------------|----------------|
//! | `register` |          |        |                  | password       |
//! | `charge`   | required | required |                | card data      |
//! | `withdraw` | required | required | destination card |              |
//! | `transfer` | required | required | recipient handle | message      |
//! | `exchange` | from     | required | to currency    |                |

use crate::core::HandleBalance;
use crate::types::{Currency, LedgerEntry, Operation, OperationRecord, WalletError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// CSV record structure for deserialization
///
/// Everything past `user` is optional; which columns are required depends
/// on the operation type.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct CsvRecord {
    #[serde(rename = "type")]
    pub op_type: String,
    pub user: String,
    pub currency: Option<String>,
    pub amount: Option<String>,
    pub target: Option<String>,
    pub reference: Option<String>,
}

/// Convert a CsvRecord to an OperationRecord
///
/// Only the shape of the row is checked here. Whether an amount is positive
/// or fits its currency's precision is decided by the wallet core, so such
/// rows still reach it and produce a rejected outcome.
///
/// # Errors
///
/// * `InvalidOperationType` - unknown `type`
/// * `UnsupportedCurrency` - unknown currency code
/// * `ParseError` - missing user, amount, currency or target, or an
///   unparsable amount
pub fn convert_csv_record(csv_record: CsvRecord, line: u64) -> Result<OperationRecord, WalletError> {
    let user = csv_record.user.trim().to_string();
    if user.is_empty() {
        return Err(parse_error(line, "missing user"));
    }

    let op_type = csv_record.op_type.trim().to_lowercase();
    let operation = match op_type.as_str() {
        "register" => Operation::Register {
            password: non_empty(csv_record.reference),
        },
        "charge" => Operation::Charge {
            amount: amount(&csv_record, line)?,
            currency: currency(&csv_record, line)?,
            card_data: non_empty(csv_record.reference),
        },
        "withdraw" => Operation::Withdraw {
            amount: amount(&csv_record, line)?,
            currency: currency(&csv_record, line)?,
            destination: required(csv_record.target, line, "destination card")?,
        },
        "transfer" => Operation::Transfer {
            amount: amount(&csv_record, line)?,
            currency: currency(&csv_record, line)?,
            recipient: required(csv_record.target, line, "recipient")?,
            message: non_empty(csv_record.reference),
        },
        "exchange" => Operation::Exchange {
            amount: amount(&csv_record, line)?,
            from: currency(&csv_record, line)?,
            to: Currency::from_str(&required(csv_record.target, line, "target currency")?)?,
        },
        _ => return Err(WalletError::invalid_operation_type(&csv_record.op_type)),
    };

    Ok(OperationRecord {
        line,
        user,
        operation,
    })
}

fn parse_error(line: u64, message: impl Into<String>) -> WalletError {
    WalletError::ParseError {
        line: Some(line),
        message: message.into(),
    }
}

fn non_empty(field: Option<String>) -> Option<String> {
    field
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(field: Option<String>, line: u64, name: &str) -> Result<String, WalletError> {
    non_empty(field).ok_or_else(|| parse_error(line, format!("missing {}", name)))
}

fn amount(record: &CsvRecord, line: u64) -> Result<Decimal, WalletError> {
    let raw = required(record.amount.clone(), line, "amount")?;
    Decimal::from_str(&raw).map_err(|_| parse_error(line, format!("invalid amount '{}'", raw)))
}

fn currency(record: &CsvRecord, line: u64) -> Result<Currency, WalletError> {
    Currency::from_str(&required(record.currency.clone(), line, "currency")?)
}

/// Write the balance report in CSV format
///
/// Columns: user, currency, balance. Rows are written in the order given
/// (see [`crate::core::ReplayEngine::balance_report`]); amounts are padded to
/// the currency's scale.
pub fn write_balances_csv(
    balances: &[HandleBalance],
    output: &mut dyn Write,
) -> Result<(), WalletError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record(["user", "currency", "balance"])?;
    for row in balances {
        writer.write_record([
            row.handle.as_str(),
            row.currency.code(),
            row.currency.format_amount(row.amount).as_str(),
        ])?;
    }
    writer.flush()?;

    Ok(())
}

/// Write ledger entries in CSV format, one row per entry in ledger order
///
/// `metadata` is embedded as a JSON string.
pub fn write_ledger_csv(entries: &[LedgerEntry], output: &mut dyn Write) -> Result<(), WalletError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record([
        "id",
        "user_id",
        "type",
        "amount",
        "currency",
        "from_currency",
        "to_currency",
        "status",
        "description",
        "metadata",
        "created_at",
    ])?;
    for entry in entries {
        writer.write_record([
            entry.id.to_string(),
            entry.user_id.to_string(),
            entry.kind.as_str().to_string(),
            entry.currency.format_amount(entry.amount),
            entry.currency.to_string(),
            entry.from_currency.map(|c| c.to_string()).unwrap_or_default(),
            entry.to_currency.map(|c| c.to_string()).unwrap_or_default(),
            entry.status.as_str().to_string(),
            entry.description.clone(),
            entry.metadata.to_string(),
            entry.created_at.to_rfc3339(),
        ])?;
    }
    writer.flush()?;

    Ok(())
}
