//! Rate sources
//!
//! A [`RateSource`] produces one number: the current USD→IRR rate. Every
//! other pair the wallet supports is derived from it by the provider.

use crate::types::WalletError;
use rust_decimal::Decimal;

/// Something that can quote the USD→IRR market rate
///
/// Sources are untrusted: the provider range-checks whatever they return.
pub trait RateSource: Send + Sync {
    /// Short name used in logs and in the quote's origin tag
    fn name(&self) -> &str;

    /// Fetch the current USD→IRR rate
    ///
    /// Implementations must bound the time they spend (network timeouts)
    /// and report failures as `RateProviderUnavailable`.
    fn fetch_usd_irr(&self) -> Result<Decimal, WalletError>;
}

/// Source that always returns the same rate
///
/// Used to pin the rate from the command line and in tests.
#[derive(Debug, Clone)]
pub struct FixedRateSource {
    name: String,
    rate: Decimal,
}

impl FixedRateSource {
    pub fn new(name: impl Into<String>, rate: Decimal) -> Self {
        Self {
            name: name.into(),
            rate,
        }
    }
}

impl RateSource for FixedRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_usd_irr(&self) -> Result<Decimal, WalletError> {
        Ok(self.rate)
    }
}

/// Parse a rate as published by market-data sites
///
/// Accepts plain numbers as well as strings with thousands separators
/// (`"1,070,000"`).
pub fn parse_rate_text(source_name: &str, text: &str) -> Result<Decimal, WalletError> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '_' && !c.is_whitespace())
        .collect();
    cleaned
        .parse::<Decimal>()
        .map_err(|e| WalletError::rate_unavailable(source_name, format!("unparsable rate '{}': {}", text, e)))
}
