//! Asynchronous batch processing strategy
//!
//! # Architecture
//!
//! ```text
//! AsyncProcessingStrategy
//!     ├── BatchConfig (batch_size, max_concurrent_batches)
//!     ├── AsyncReader (batch CSV reading)
//!     └── BatchProcessor (user-group partitioning + blocking pool)
//!         └── ReplayEngine ──> WalletOperations (shared, lock-per-user state)
//! ```
//!
//! Batches run one after another, so a user's records that straddle a batch
//! boundary stay in order. Inside a batch, groups of connected users run in
//! parallel on tokio's blocking pool.
//!
//! The wallet (and with it any HTTP rate client) is built before the runtime
//! starts and dropped after it stops; blocking HTTP clients may not be
//! created or dropped on an async worker thread.

use crate::config::WalletConfig;
use crate::core::BatchProcessor;
use crate::io::async_reader::AsyncReader;
use crate::io::OutcomeReport;
use crate::strategy::{new_engine, write_reports, ProcessingStrategy, ReplayOptions};
use crate::types::WalletError;
use std::io::Write;
use std::path::Path;

/// Configuration for batch processing
#[derive(Clone, Debug, PartialEq)]
pub struct BatchConfig {
    /// Number of records per batch
    pub batch_size: usize,
    /// Maximum number of user groups processed at once
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a BatchConfig, replacing zero values with defaults
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            tracing::warn!(
                default = default.batch_size,
                "invalid batch_size 0, using default"
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            tracing::warn!(
                default = default.max_concurrent_batches,
                "invalid max_concurrent_batches 0, using default"
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

/// Asynchronous batch replay
#[derive(Debug, Clone)]
pub struct AsyncProcessingStrategy {
    batch: BatchConfig,
    config: WalletConfig,
    options: ReplayOptions,
}

impl AsyncProcessingStrategy {
    pub fn new(batch: BatchConfig, config: WalletConfig, options: ReplayOptions) -> Self {
        Self {
            batch,
            config,
            options,
        }
    }
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), WalletError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.batch.max_concurrent_batches)
            .max_blocking_threads(self.batch.max_concurrent_batches)
            .enable_all()
            .build()
            .map_err(|e| WalletError::IoError {
                message: format!("failed to create tokio runtime: {}", e),
            })?;

        let engine = new_engine(&self.config)?;
        let processor = BatchProcessor::new(engine.clone());
        let mut report = OutcomeReport::new();

        runtime.block_on(async {
            let file = tokio::fs::File::open(input_path)
                .await
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => WalletError::FileNotFound {
                        path: input_path.display().to_string(),
                    },
                    _ => WalletError::IoError {
                        message: format!("failed to open '{}': {}", input_path.display(), e),
                    },
                })?;
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);

            loop {
                let batch = reader.read_batch(self.batch.batch_size).await;
                for (line, error) in reader.take_skipped() {
                    report.record_rejected_row(line, &error);
                }
                if batch.is_empty() {
                    break;
                }

                for result in processor.process_batch(batch).await {
                    report.record(&result);
                }
            }

            Ok::<(), WalletError>(())
        })?;
        drop(runtime);

        write_reports(&engine, &mut report, &self.options, output)
    }
}
