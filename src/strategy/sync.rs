//! Synchronous processing strategy
//!
//! Streams records through [`SyncReader`] and applies them one at a time on
//! the calling thread. This is the reference ordering: the async strategy
//! must produce the same balances.

use crate::config::WalletConfig;
use crate::io::sync_reader::SyncReader;
use crate::io::OutcomeReport;
use crate::strategy::{new_engine, write_reports, ProcessingStrategy, ReplayOptions};
use crate::types::WalletError;
use std::io::Write;
use std::path::Path;

/// Single-threaded replay in input order
///
/// ```no_run
/// use wallet_engine::config::WalletConfig;
/// use wallet_engine::strategy::{ProcessingStrategy, ReplayOptions, SyncProcessingStrategy};
/// use std::path::Path;
///
/// let strategy = SyncProcessingStrategy::new(WalletConfig::default(), ReplayOptions::default());
/// strategy
///     .process(Path::new("operations.csv"), &mut std::io::stdout())
///     .expect("replay failed");
/// ```
#[derive(Debug, Clone)]
pub struct SyncProcessingStrategy {
    config: WalletConfig,
    options: ReplayOptions,
}

impl SyncProcessingStrategy {
    pub fn new(config: WalletConfig, options: ReplayOptions) -> Self {
        Self { config, options }
    }
}

impl ProcessingStrategy for SyncProcessingStrategy {
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), WalletError> {
        let mut reader = SyncReader::new(input_path)?;
        let engine = new_engine(&self.config)?;
        let mut report = OutcomeReport::new();

        while let Some(row) = reader.next() {
            match row {
                Ok(record) => report.record(&engine.process_record(record)),
                Err(e) => {
                    tracing::warn!(line = reader.line_number(), error = %e, "skipping malformed row");
                    report.record_rejected_row(reader.line_number(), &e);
                }
            }
        }

        write_reports(&engine, &mut report, &self.options, output)
    }
}
