use crate::config::{WalletConfig, WithdrawMode};
use crate::logging::LogFormat;
use crate::strategy::{BatchConfig, ReplayOptions};
use clap::{Parser, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Replay wallet operations and report the resulting balances
#[derive(Parser, Debug)]
#[command(name = "wallet-engine")]
#[command(
    about = "Replay multi-currency wallet operations (USD, USDT, IRR) and print final balances",
    long_about = None
)]
pub struct CliArgs {
    /// Input CSV file: type,user,currency,amount,target,reference
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "async",
        help = "Processing strategy: 'sync' for in-order or 'async' for concurrent batches"
    )]
    pub strategy: StrategyType,

    /// Number of records per batch (async mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of records per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Maximum number of user groups processed at once (async mode only)
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Maximum number of user groups processing concurrently (default: CPU cores)"
    )]
    pub max_concurrent_batches: Option<usize>,

    /// Pin the USD/IRR rate instead of (or ahead of) the HTTP source
    #[arg(long = "usd-irr", value_name = "RATE")]
    pub usd_irr: Option<Decimal>,

    /// HTTP endpoint returning the USD/IRR rate as JSON
    #[arg(long = "rate-url", value_name = "URL")]
    pub rate_url: Option<String>,

    /// JSON pointer to the rate inside the HTTP response
    #[arg(long = "rate-pointer", value_name = "POINTER")]
    pub rate_pointer: Option<String>,

    #[arg(
        long = "withdraw-mode",
        value_name = "MODE",
        help = "Withdrawal rules: 'simple' or 'fee' (1% fee, card check, pending)"
    )]
    pub withdraw_mode: Option<WithdrawMode>,

    /// Also write every ledger entry as CSV to this file
    #[arg(long = "ledger", value_name = "PATH")]
    pub ledger: Option<PathBuf>,

    /// Also write one JSON outcome per input row to this file
    #[arg(long = "outcomes", value_name = "PATH")]
    pub outcomes: Option<PathBuf>,

    #[arg(
        long = "log-format",
        value_name = "FORMAT",
        default_value = "pretty",
        help = "Log format on stderr: 'pretty' or 'json'"
    )]
    pub log_format: LogFormat,
}

/// Available processing strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

impl CliArgs {
    /// Create a BatchConfig from CLI arguments, defaults for anything unset
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.max_concurrent_batches.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent_batches
                    .unwrap_or(default.max_concurrent_batches),
            )
        } else {
            BatchConfig::default()
        }
    }

    /// Override `config` with every flag that was given
    pub fn apply_to(&self, config: &mut WalletConfig) {
        if let Some(rate) = self.usd_irr {
            config.pinned_usd_irr = Some(rate);
        }
        if let Some(url) = &self.rate_url {
            config.rate_url = Some(url.clone());
        }
        if let Some(pointer) = &self.rate_pointer {
            config.rate_pointer = pointer.clone();
        }
        if let Some(mode) = self.withdraw_mode {
            config.withdraw_mode = mode;
        }
    }

    pub fn to_replay_options(&self) -> ReplayOptions {
        ReplayOptions {
            ledger_path: self.ledger.clone(),
            outcomes_path: self.outcomes.clone(),
        }
    }
}
