//! Wallet engine CLI
//!
//! Replays a CSV file of wallet operations and prints the final balances.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- operations.csv > balances.csv
//! cargo run -- --strategy sync operations.csv > balances.csv
//! cargo run -- --usd-irr 1070000 --ledger ledger.csv --outcomes outcomes.jsonl operations.csv
//! RUST_LOG=wallet_engine=debug cargo run -- --log-format json operations.csv
//! ```
//!
//! Balances go to stdout; logs go to stderr.
//!
//! # Exit Codes
//!
//! - 0: Success (individual rejected operations don't count as failure)
//! - 1: Error (bad configuration, unreadable input, unwritable report)

use std::process;
use wallet_engine::cli;
use wallet_engine::config::WalletConfig;
use wallet_engine::logging;
use wallet_engine::strategy;

fn main() {
    let args = cli::parse_args();
    logging::init_logging("warn", args.log_format);

    let mut config = match WalletConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    args.apply_to(&mut config);

    let batch = matches!(args.strategy, cli::StrategyType::Async).then(|| args.to_batch_config());
    let strategy =
        strategy::create_strategy(args.strategy, batch, config, args.to_replay_options());

    let mut output = std::io::stdout().lock();
    if let Err(e) = strategy.process(&args.input_file, &mut output) {
        tracing::error!(error = %e, "replay failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
