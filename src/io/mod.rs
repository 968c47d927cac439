//! I/O module
//!
//! Handles CSV parsing and report output.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (record conversion, balance and ledger output)
//! - `sync_reader` - Synchronous CSV reader with iterator interface
//! - `async_reader` - Asynchronous CSV reader with batch reading interface
//! - `outcomes` - JSON-lines report of per-row results

pub mod async_reader;
pub mod csv_format;
pub mod outcomes;
pub mod sync_reader;

pub use async_reader::AsyncReader;
pub use csv_format::{convert_csv_record, write_balances_csv, write_ledger_csv, CsvRecord};
pub use outcomes::OutcomeReport;
pub use sync_reader::SyncReader;
