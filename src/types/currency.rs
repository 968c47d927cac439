//! Supported currencies and their precision rules
//!
//! Every balance, ledger entry and rate quote is tagged with a [`Currency`].
//! Unknown currency codes are rejected at parse time so that no storage
//! call ever sees a currency the wallet cannot hold.

use super::error::WalletError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currencies a wallet can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// US dollar, two decimal places
    Usd,
    /// Tether stablecoin, six decimal places (TRC20 token precision)
    Usdt,
    /// Iranian rial, no minor unit
    Irr,
}

impl Currency {
    /// All supported currencies in display order
    pub const ALL: [Currency; 3] = [Currency::Usd, Currency::Usdt, Currency::Irr];

    /// ISO-style code used on the wire
    pub fn code(self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Usdt => "USDT",
            Currency::Irr => "IRR",
        }
    }

    /// Number of decimal places an amount in this currency may carry
    pub fn scale(self) -> u32 {
        match self {
            Currency::Usd => 2,
            Currency::Usdt => 6,
            Currency::Irr => 0,
        }
    }

    /// Round a derived amount (fee, conversion result) to this currency's scale
    ///
    /// Uses banker's rounding so that repeated fee calculations don't drift
    /// in one direction.
    pub fn round(self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.scale(), RoundingStrategy::MidpointNearestEven)
    }

    /// Round a charge against the user up to this currency's scale
    pub fn round_up(self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.scale(), RoundingStrategy::AwayFromZero)
    }

    /// Check that a caller-supplied amount is representable in this currency
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::Validation`] if the amount is not strictly
    /// positive or carries more decimal places than [`Currency::scale`].
    pub fn validate_amount(self, amount: Decimal) -> Result<(), WalletError> {
        if amount <= Decimal::ZERO {
            return Err(WalletError::validation(format!(
                "amount must be positive, got {}",
                amount
            )));
        }
        if amount.normalize().scale() > self.scale() {
            return Err(WalletError::validation(format!(
                "{} supports at most {} decimal places, got {}",
                self.code(),
                self.scale(),
                amount
            )));
        }
        Ok(())
    }

    /// Format an amount at this currency's scale for CSV output
    pub fn format_amount(self, amount: Decimal) -> String {
        format!("{:.*}", self.scale() as usize, amount)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "USDT" => Ok(Currency::Usdt),
            "IRR" => Ok(Currency::Irr),
            _ => Err(WalletError::unsupported_currency(s)),
        }
    }
}
