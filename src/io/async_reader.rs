//! Asynchronous CSV reader with batch interface
//!
//! ```text
//! CSV bytes ──> AsyncReader ──> batches of OperationRecords
//!                   │
//!             csv_format module
//!       (CsvRecord, convert_csv_record)
//! ```
//!
//! Rows that fail to parse are logged and skipped; they never end a batch.

use crate::io::csv_format::{convert_csv_record, CsvRecord};
use crate::types::{OperationRecord, WalletError};
use csv_async::{AsyncReaderBuilder, StringRecord};
use futures::io::AsyncRead;

/// Asynchronous CSV reader
pub struct AsyncReader<R: AsyncRead + Unpin + Send> {
    csv_reader: csv_async::AsyncReader<R>,
    headers: Option<StringRecord>,
    record: StringRecord,
    /// File line where the last row started; the header is line 1
    line_num: u64,
    skipped: Vec<(u64, WalletError)>,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_reader(reader);

        Self {
            csv_reader,
            headers: None,
            record: StringRecord::new(),
            line_num: 1,
            skipped: Vec::new(),
        }
    }

    /// Read up to `batch_size` valid records
    ///
    /// Returns an empty vector at end of input, or when the header row
    /// cannot be read.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<OperationRecord> {
        let headers = match self.headers.take() {
            Some(headers) => headers,
            None => match self.csv_reader.headers().await {
                Ok(headers) => headers.clone(),
                Err(e) => {
                    tracing::warn!(error = %e, "unreadable header row");
                    self.skipped.push((
                        1,
                        WalletError::ParseError {
                            line: Some(1),
                            message: e.to_string(),
                        },
                    ));
                    return Vec::new();
                }
            },
        };

        let mut batch = Vec::with_capacity(batch_size);
        while batch.len() < batch_size {
            let fallback = self.line_num + 1;
            let converted = match self.csv_reader.read_record(&mut self.record).await {
                Ok(false) => break,
                Ok(true) => {
                    self.line_num = self.record.position().map_or(fallback, |p| p.line());
                    let line = self.line_num;
                    self.record
                        .deserialize::<CsvRecord>(Some(&headers))
                        .map_err(|e| WalletError::ParseError {
                            line: Some(line),
                            message: e.to_string(),
                        })
                        .and_then(|csv_record| convert_csv_record(csv_record, line))
                }
                Err(e) => {
                    self.line_num = e.position().map_or(fallback, |p| p.line());
                    Err(WalletError::ParseError {
                        line: Some(self.line_num),
                        message: e.to_string(),
                    })
                }
            };
            match converted {
                Ok(record) => batch.push(record),
                Err(e) => {
                    tracing::warn!(line = self.line_num, error = %e, "skipping malformed row");
                    self.skipped.push((self.line_num, e));
                }
            }
        }

        self.headers = Some(headers);
        batch
    }

    /// `(line, error)` for every row skipped since the last call
    pub fn take_skipped(&mut self) -> Vec<(u64, WalletError)> {
        std::mem::take(&mut self.skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Currency, Operation};
    use futures::io::Cursor;
    use rust_decimal::Decimal;

    const HEADER: &str = "type,user,currency,amount,target,reference\n";

    fn reader(rows: &str) -> AsyncReader<Cursor<Vec<u8>>> {
        AsyncReader::new(Cursor::new(format!("{}{}", HEADER, rows).into_bytes()))
    }

    #[tokio::test]
    async fn test_async_reader_read_batch() {
        let mut async_reader = reader(
            "charge,alice,USD,100.0,,\nwithdraw,alice,USD,50,6037991234561234,\ncharge,bob,IRR,200,,\n",
        );

        let batch = async_reader.read_batch(2).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].user, "alice");
        assert_eq!(batch[0].line, 2);
        assert_eq!(batch[1].operation.name(), "withdraw");

        let batch = async_reader.read_batch(2).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].user, "bob");
        assert_eq!(batch[0].line, 4);

        assert!(async_reader.read_batch(2).await.is_empty());
    }

    #[tokio::test]
    async fn test_async_reader_empty_csv() {
        let mut async_reader = reader("");
        assert!(async_reader.read_batch(10).await.is_empty());
    }

    #[tokio::test]
    async fn test_async_reader_skips_invalid_rows() {
        let mut async_reader = reader(
            "deposit,alice,USD,1,,\ncharge,alice,USD,abc,,\ncharge,alice,USD,50,,\n",
        );

        let batch = async_reader.read_batch(10).await;

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].line, 4);
        let skipped = async_reader.take_skipped();
        assert_eq!(skipped.len(), 2);
        assert_eq!(
            skipped[0],
            (2, WalletError::invalid_operation_type("deposit"))
        );
        assert_eq!(skipped[1].0, 3);
        assert!(matches!(
            skipped[1].1,
            WalletError::ParseError { line: Some(3), .. }
        ));
        assert!(async_reader.take_skipped().is_empty());
    }

    #[tokio::test]
    async fn test_async_reader_line_numbers_follow_the_file() {
        let mut async_reader = reader(
            "charge,alice,USD,1,,\ntransfer,alice,USD,1,bob,\"two\nlines\"\ncharge,alice,USD,2,,\n",
        );

        let batch = async_reader.read_batch(10).await;

        let lines: Vec<u64> = batch.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![2, 3, 5]);
    }

    #[tokio::test]
    async fn test_async_reader_whitespace_handling() {
        let mut async_reader = reader("  exchange , alice , usd , 10 , irr ,\n");

        let batch = async_reader.read_batch(10).await;

        assert_eq!(
            batch[0].operation,
            Operation::Exchange {
                amount: Decimal::from(10),
                from: Currency::Usd,
                to: Currency::Irr,
            }
        );
    }
}
