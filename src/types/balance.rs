//! Per-user balances
//!
//! A [`Wallet`] holds one optional balance slot per supported currency.
//! A slot is `None` until the first write touches it, which is how
//! "lazily materialized" balance rows are represented in memory.

use super::currency::Currency;
use super::error::WalletError;
use super::transaction::UserId;
use rust_decimal::Decimal;

/// All balances owned by one user
#[derive(Debug, Clone, PartialEq)]
pub struct Wallet {
    pub user: UserId,
    usd: Option<Decimal>,
    usdt: Option<Decimal>,
    irr: Option<Decimal>,
}

/// One materialized (user, currency) balance row
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceRow {
    pub user: UserId,
    pub currency: Currency,
    pub amount: Decimal,
}

impl Wallet {
    /// Create a wallet with no materialized balances
    pub fn new(user: UserId) -> Self {
        Wallet {
            user,
            usd: None,
            usdt: None,
            irr: None,
        }
    }

    fn slot(&self, currency: Currency) -> Option<Decimal> {
        match currency {
            Currency::Usd => self.usd,
            Currency::Usdt => self.usdt,
            Currency::Irr => self.irr,
        }
    }

    fn slot_mut(&mut self, currency: Currency) -> &mut Option<Decimal> {
        match currency {
            Currency::Usd => &mut self.usd,
            Currency::Usdt => &mut self.usdt,
            Currency::Irr => &mut self.irr,
        }
    }

    /// Current balance; zero when the row was never written
    pub fn balance(&self, currency: Currency) -> Decimal {
        self.slot(currency).unwrap_or(Decimal::ZERO)
    }

    /// Add `delta` (which may be negative) to a balance, materializing it
    ///
    /// # Errors
    ///
    /// * `InsufficientFunds` - the result would be negative
    /// * `ArithmeticOverflow` - the sum does not fit in a `Decimal`
    ///
    /// On error the wallet is left untouched.
    pub fn adjust(&mut self, currency: Currency, delta: Decimal) -> Result<Decimal, WalletError> {
        let current = self.balance(currency);
        let next = current
            .checked_add(delta)
            .ok_or_else(|| WalletError::arithmetic_overflow("balance adjustment"))?;

        if next < Decimal::ZERO {
            return Err(WalletError::insufficient_funds(currency, current, -delta));
        }

        *self.slot_mut(currency) = Some(next);
        Ok(next)
    }

    /// Increase a balance by a positive amount
    pub fn credit(&mut self, currency: Currency, amount: Decimal) -> Result<Decimal, WalletError> {
        self.adjust(currency, amount)
    }

    /// Decrease a balance, refusing to go below zero
    pub fn debit(&mut self, currency: Currency, amount: Decimal) -> Result<Decimal, WalletError> {
        self.adjust(currency, -amount)
    }

    /// Materialized rows, in currency order
    pub fn rows(&self) -> Vec<BalanceRow> {
        Currency::ALL
            .iter()
            .filter_map(|&currency| {
                self.slot(currency).map(|amount| BalanceRow {
                    user: self.user,
                    currency,
                    amount,
                })
            })
            .collect()
    }
}
