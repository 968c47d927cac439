//! JSON-lines report of per-row results
//!
//! One object per processed row: the input line and operation name, followed
//! by the fields of [`OperationOutcome`]. Rows rejected by the parser are
//! reported with operation `"invalid"`.

use crate::core::ProcessingResult;
use crate::types::{OperationOutcome, WalletError};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct OutcomeLine<'a> {
    line: u64,
    operation: &'a str,
    #[serde(flatten)]
    outcome: OperationOutcome,
}

/// Collects outcome lines in input order
#[derive(Debug, Default)]
pub struct OutcomeReport {
    rows: Vec<(u64, String, OperationOutcome)>,
}

impl OutcomeReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: &ProcessingResult) {
        self.rows.push((
            result.record.line,
            result.record.operation.name().to_string(),
            result.outcome(),
        ));
    }

    /// Record a row the parser rejected at file line `line`
    pub fn record_rejected_row(&mut self, line: u64, error: &WalletError) {
        self.rows
            .push((line, "invalid".to_string(), OperationOutcome::failed(error)));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write one JSON object per line, ordered by input line
    pub fn write_jsonl(&mut self, output: &mut dyn Write) -> Result<(), WalletError> {
        self.rows.sort_by_key(|(line, _, _)| *line);
        for (line, operation, outcome) in &self.rows {
            let json = serde_json::to_string(&OutcomeLine {
                line: *line,
                operation,
                outcome: outcome.clone(),
            })
            .map_err(|e| WalletError::IoError {
                message: format!("failed to encode outcome: {}", e),
            })?;
            writeln!(output, "{}", json)?;
        }
        output.flush()?;
        Ok(())
    }
}
