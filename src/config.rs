//! Runtime configuration
//!
//! [`WalletConfig`] starts from built-in defaults, is overridden by
//! environment variables, and finally by command-line flags (see
//! `cli::CliArgs::apply_to`).
//!
//! | Variable                   | Default     | Meaning                                  |
//! |----------------------------|-------------|------------------------------------------|
//! | `WALLET_EXCHANGE_FEE`      | `0.005`     | Fee fraction on exchanged amounts        |
//! | `WALLET_WITHDRAW_FEE`      | `0.01`      | Fee fraction on fee-inclusive withdraws  |
//! | `WALLET_RATE_TTL_SECS`     | `300`       | Rate snapshot lifetime                   |
//! | `WALLET_FALLBACK_USD_IRR`  | `1070000`   | Rate used when no source ever succeeded  |
//! | `WALLET_RATE_URL`          | unset       | HTTP JSON rate endpoint                  |
//! | `WALLET_RATE_POINTER`      | `/usd_irr`  | JSON pointer to the rate in the response |
//! | `WALLET_RATE_TIMEOUT_SECS` | `10`        | HTTP request timeout                     |

use crate::rates::{FixedRateSource, HttpRateSource, RateProvider, RateSettings, RateSource};
use crate::types::WalletError;
use clap::ValueEnum;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

/// Which withdrawal rules apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WithdrawMode {
    /// Debit exactly the amount, record as `completed`
    Simple,
    /// Charge a percentage fee on top, validate the card, record as `pending`
    #[value(name = "fee")]
    FeeInclusive,
}

/// Everything the wallet core and rate provider can be tuned with
#[derive(Debug, Clone, PartialEq)]
pub struct WalletConfig {
    pub exchange_fee: Decimal,
    pub withdraw_fee: Decimal,
    pub withdraw_mode: WithdrawMode,
    pub rate_ttl: Duration,
    pub fallback_usd_irr: Decimal,
    pub min_usd_irr: Decimal,
    pub max_usd_irr: Decimal,
    /// Rate pinned from the command line; tried before any HTTP source
    pub pinned_usd_irr: Option<Decimal>,
    pub rate_url: Option<String>,
    pub rate_pointer: String,
    pub rate_timeout: Duration,
}

impl Default for WalletConfig {
    fn default() -> Self {
        let rates = RateSettings::default();
        Self {
            exchange_fee: rates.exchange_fee,
            withdraw_fee: Decimal::new(1, 2),
            withdraw_mode: WithdrawMode::FeeInclusive,
            rate_ttl: rates.ttl,
            fallback_usd_irr: rates.fallback_usd_irr,
            min_usd_irr: rates.min_usd_irr,
            max_usd_irr: rates.max_usd_irr,
            pinned_usd_irr: None,
            rate_url: None,
            rate_pointer: "/usd_irr".to_string(),
            rate_timeout: Duration::from_secs(10),
        }
    }
}

impl WalletConfig {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, WalletError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WalletError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(fee) = parse_var(&lookup, "WALLET_EXCHANGE_FEE")? {
            config.exchange_fee = fraction("WALLET_EXCHANGE_FEE", fee)?;
        }
        if let Some(fee) = parse_var(&lookup, "WALLET_WITHDRAW_FEE")? {
            config.withdraw_fee = fraction("WALLET_WITHDRAW_FEE", fee)?;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "WALLET_RATE_TTL_SECS")? {
            config.rate_ttl = Duration::from_secs(secs);
        }
        if let Some(rate) = parse_var::<Decimal, _>(&lookup, "WALLET_FALLBACK_USD_IRR")? {
            if rate <= Decimal::ZERO {
                return Err(WalletError::config(
                    "WALLET_FALLBACK_USD_IRR",
                    "must be positive",
                ));
            }
            config.fallback_usd_irr = rate;
        }
        if let Some(url) = lookup("WALLET_RATE_URL").filter(|url| !url.trim().is_empty()) {
            config.rate_url = Some(url.trim().to_string());
        }
        if let Some(pointer) = lookup("WALLET_RATE_POINTER") {
            config.rate_pointer = pointer;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "WALLET_RATE_TIMEOUT_SECS")? {
            if secs == 0 {
                return Err(WalletError::config(
                    "WALLET_RATE_TIMEOUT_SECS",
                    "must be at least 1",
                ));
            }
            config.rate_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Settings for the rate provider
    pub fn rate_settings(&self) -> RateSettings {
        RateSettings {
            ttl: self.rate_ttl,
            fallback_usd_irr: self.fallback_usd_irr,
            min_usd_irr: self.min_usd_irr,
            max_usd_irr: self.max_usd_irr,
            exchange_fee: self.exchange_fee,
        }
    }

    /// Build a rate provider with the configured sources, pinned rate first
    pub fn build_rate_provider(&self) -> Result<RateProvider, WalletError> {
        let mut sources: Vec<Box<dyn RateSource>> = Vec::new();

        if let Some(rate) = self.pinned_usd_irr {
            sources.push(Box::new(FixedRateSource::new("pinned", rate)));
        }
        if let Some(url) = &self.rate_url {
            sources.push(Box::new(HttpRateSource::new(
                "http",
                url.clone(),
                self.rate_pointer.clone(),
                self.rate_timeout,
            )?));
        }

        Ok(RateProvider::new(sources, self.rate_settings()))
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, WalletError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| WalletError::config(key, format!("'{}': {}", raw, e)))
        })
        .transpose()
}

fn fraction(key: &str, value: Decimal) -> Result<Decimal, WalletError> {
    if value < Decimal::ZERO || value >= Decimal::ONE {
        return Err(WalletError::config(key, format!("{} is not a fraction in [0, 1)", value)));
    }
    Ok(value)
}
