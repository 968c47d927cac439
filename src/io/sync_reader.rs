//! Synchronous CSV reader with iterator interface
//!
//! Streams operation records from a CSV file one row at a time, delegating
//! format concerns to the csv_format module.
//!
//! ```no_run
//! use wallet_engine::io::sync_reader::SyncReader;
//! use std::path::Path;
//!
//! let reader = SyncReader::new(Path::new("operations.csv")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok(record) => println!("{} by {}", record.operation.name(), record.user),
//!         Err(e) => eprintln!("Skipping row: {}", e),
//!     }
//! }
//! ```
//!
//! Fatal errors (file not found, unreadable file) come from `new()`. Bad rows
//! are yielded as `Err` items and carry their line number.

use crate::io::csv_format::{convert_csv_record, CsvRecord};
use crate::types::{OperationRecord, WalletError};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs::File;
use std::path::Path;

/// Synchronous CSV reader
#[derive(Debug)]
pub struct SyncReader {
    reader: csv::Reader<File>,
    headers: StringRecord,
    record: StringRecord,
    /// File line where the last row started; the header is line 1
    line_num: u64,
}

impl SyncReader {
    /// Open a CSV file for streaming
    ///
    /// Fields are trimmed and rows may omit trailing optional columns.
    ///
    /// # Errors
    ///
    /// * `FileNotFound` - the path does not exist
    /// * `IoError` - any other open failure
    /// * `ParseError` - the header row is unreadable
    pub fn new(path: &Path) -> Result<Self, WalletError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => WalletError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => WalletError::IoError {
                message: format!("failed to open '{}': {}", path.display(), e),
            },
        })?;

        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);
        let headers = reader
            .headers()
            .map_err(|e| WalletError::ParseError {
                line: Some(1),
                message: e.to_string(),
            })?
            .clone();

        Ok(Self {
            reader,
            headers,
            record: StringRecord::new(),
            line_num: 1,
        })
    }

    /// File line of the row most recently yielded
    pub fn line_number(&self) -> u64 {
        self.line_num
    }
}

impl Iterator for SyncReader {
    type Item = Result<OperationRecord, WalletError>;

    fn next(&mut self) -> Option<Self::Item> {
        let fallback = self.line_num + 1;
        match self.reader.read_record(&mut self.record) {
            Ok(false) => None,
            Ok(true) => {
                self.line_num = self.record.position().map_or(fallback, |p| p.line());
                let line = self.line_num;
                Some(
                    self.record
                        .deserialize::<CsvRecord>(Some(&self.headers))
                        .map_err(|e| WalletError::ParseError {
                            line: Some(line),
                            message: e.to_string(),
                        })
                        .and_then(|csv_record| convert_csv_record(csv_record, line)),
                )
            }
            Err(e) => {
                self.line_num = e.position().map_or(fallback, |p| p.line());
                Some(Err(WalletError::ParseError {
                    line: Some(self.line_num),
                    message: e.to_string(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Currency, Operation};
    use rust_decimal::Decimal;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "type,user,currency,amount,target,reference\n";

    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[test]
    fn test_sync_reader_fails_on_missing_file() {
        let err = SyncReader::new(Path::new("nonexistent.csv")).unwrap_err();
        assert!(matches!(err, WalletError::FileNotFound { .. }));
    }

    #[test]
    fn test_sync_reader_iterates_records() {
        let file = create_temp_csv(&format!(
            "{}charge,alice,USD,100.0,,\nexchange,alice,USD,10,IRR,\n",
            HEADER
        ));

        let records: Vec<_> = SyncReader::new(file.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line, 2);
        assert_eq!(
            records[0].operation,
            Operation::Charge {
                amount: Decimal::new(1000, 1),
                currency: Currency::Usd,
                card_data: None,
            }
        );
        assert_eq!(records[1].line, 3);
        assert_eq!(records[1].operation.name(), "exchange");
    }

    #[test]
    fn test_sync_reader_short_rows_and_whitespace() {
        let file = create_temp_csv(&format!(
            "{}  register , bob \n charge , bob , IRR , 5000 \n",
            HEADER
        ));

        let records: Vec<_> = SyncReader::new(file.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(records[0].user, "bob");
        assert_eq!(records[0].operation, Operation::Register { password: None });
        assert_eq!(records[1].operation.name(), "charge");
    }

    #[test]
    fn test_sync_reader_reports_bad_rows_and_continues() {
        let file = create_temp_csv(&format!(
            "{}charge,alice,USD,1,,\nrefund,alice,USD,1,,\ncharge,alice,EUR,1,,\ncharge,alice,USD,2,,\n",
            HEADER
        ));

        let results: Vec<_> = SyncReader::new(file.path()).unwrap().collect();

        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert_eq!(
            results[1],
            Err(WalletError::invalid_operation_type("refund"))
        );
        assert!(matches!(
            results[2],
            Err(WalletError::UnsupportedCurrency { .. })
        ));
        assert_eq!(results[3].as_ref().unwrap().line, 5);
    }

    #[test]
    fn test_sync_reader_tracks_line_numbers() {
        let file = create_temp_csv(&format!("{}bogus,alice,,,,\ncharge,alice,USD,1,,\n", HEADER));
        let mut reader = SyncReader::new(file.path()).unwrap();

        assert!(reader.next().unwrap().is_err());
        assert_eq!(reader.line_number(), 2);
        assert!(reader.next().unwrap().is_ok());
        assert_eq!(reader.line_number(), 3);
    }

    #[test]
    fn test_sync_reader_line_numbers_follow_the_file() {
        let file = create_temp_csv(&format!(
            "{}charge,alice,USD,1,,\ntransfer,alice,USD,1,bob,\"two\nlines\"\ncharge,alice,USD,2,,\n",
            HEADER
        ));

        let records: Vec<_> = SyncReader::new(file.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        let lines: Vec<u64> = records.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![2, 3, 5]);
        assert_eq!(
            records[1].operation,
            Operation::Transfer {
                amount: Decimal::ONE,
                currency: Currency::Usd,
                recipient: "bob".to_string(),
                message: Some("two\nlines".to_string()),
            }
        );
    }

    #[test]
    fn test_sync_reader_header_only() {
        let file = create_temp_csv(HEADER);
        assert_eq!(SyncReader::new(file.path()).unwrap().count(), 0);
    }
}
