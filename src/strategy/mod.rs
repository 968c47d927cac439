//! Processing strategies for replaying an operations file
//!
//! A strategy owns the whole pipeline: CSV parsing, applying every record to
//! a fresh wallet, and writing the reports. Both strategies produce the same
//! balances for the same input; they differ only in how records are
//! scheduled.

use crate::cli::StrategyType;
use crate::config::WalletConfig;
use crate::core::{ReplayEngine, WalletOperations};
use crate::io::{write_balances_csv, write_ledger_csv, OutcomeReport};
use crate::types::WalletError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub mod r#async;
pub mod sync;

pub use self::r#async::{AsyncProcessingStrategy, BatchConfig};
pub use sync::SyncProcessingStrategy;

/// Optional side outputs of a replay
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayOptions {
    /// Write every ledger entry as CSV to this path
    pub ledger_path: Option<PathBuf>,
    /// Write one JSON outcome per input row to this path
    pub outcomes_path: Option<PathBuf>,
}

/// A complete replay pipeline
pub trait ProcessingStrategy: Send + Sync {
    /// Replay `input_path` and write the balance report to `output`
    ///
    /// Rejected operations and malformed rows are logged (and recorded in
    /// the outcomes report when one is requested) but never stop the run.
    ///
    /// # Errors
    ///
    /// * `FileNotFound` / `IoError` - the input can't be read or a report
    ///   can't be written
    /// * `Config` - the rate sources can't be built
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), WalletError>;
}

/// Create a processing strategy
///
/// `batch` is only used by the async strategy; `None` means defaults.
pub fn create_strategy(
    strategy_type: StrategyType,
    batch: Option<BatchConfig>,
    config: WalletConfig,
    options: ReplayOptions,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy::new(config, options)),
        StrategyType::Async => Box::new(AsyncProcessingStrategy::new(
            batch.unwrap_or_default(),
            config,
            options,
        )),
    }
}

/// Build a fresh engine for one replay
fn new_engine(config: &WalletConfig) -> Result<ReplayEngine, WalletError> {
    Ok(ReplayEngine::new(WalletOperations::from_config(config)?))
}

/// Write the balance report and any requested side outputs
fn write_reports(
    engine: &ReplayEngine,
    report: &mut OutcomeReport,
    options: &ReplayOptions,
    output: &mut dyn Write,
) -> Result<(), WalletError> {
    write_balances_csv(&engine.balance_report()?, output)?;

    if let Some(path) = &options.ledger_path {
        let entries = engine.wallet().ledger().entries()?;
        let mut file = create_report(path)?;
        write_ledger_csv(&entries, &mut file)?;
        tracing::info!(path = %path.display(), entries = entries.len(), "ledger written");
    }

    if let Some(path) = &options.outcomes_path {
        let mut file = create_report(path)?;
        report.write_jsonl(&mut file)?;
        tracing::info!(path = %path.display(), rows = report.len(), "outcomes written");
    }

    Ok(())
}

fn create_report(path: &Path) -> Result<BufWriter<File>, WalletError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| WalletError::IoError {
            message: format!("failed to create '{}': {}", path.display(), e),
        })
}
