//! Wallet operations: charge, withdraw, transfer and exchange
//!
//! This module owns the rule that balances and the ledger move together.
//! Every operation runs the same four steps:
//!
//! ```text
//! validate ──> compute ──> [lock wallet(s)] mutate copy ──> append ledger ──> commit copy
//! ```
//!
//! - **validate**: amount, currency scale, user, recipient, pair. Nothing is
//!   locked yet and nothing is written on failure.
//! - **compute**: fees and conversions. Exchange quotes are fetched here, so
//!   no network call ever happens while a wallet is locked.
//! - **mutate**: applied to a clone of the locked wallet(s). Sufficiency is
//!   checked against the locked state, which closes the check-then-act race.
//! - **record**: the ledger rows are appended while the lock is still held;
//!   only then is the clone written back. If the append fails the wallet is
//!   untouched and a `failed` row is recorded instead when possible.

use super::balance_store::BalanceStore;
use super::ledger::InMemoryLedger;
use super::traits::Ledger;
use super::users::UserDirectory;
use crate::config::{WalletConfig, WithdrawMode};
use crate::rates::{RateProvider, RateQuote};
use crate::types::{
    BalanceRow, Currency, LedgerEntry, TransactionKind, TransactionStatus, User, UserId,
    WalletError,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;

/// How a charge was paid for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    /// International card (USD)
    Card,
    /// Domestic Iranian bank card (IRR)
    IranianCard,
    /// On-chain stablecoin deposit
    Crypto,
}

impl PaymentMethod {
    /// The method each currency is charged through by default
    pub fn default_for(currency: Currency) -> Self {
        match currency {
            Currency::Usd => PaymentMethod::Card,
            Currency::Irr => PaymentMethod::IranianCard,
            Currency::Usdt => PaymentMethod::Crypto,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::IranianCard => "iranian_card",
            PaymentMethod::Crypto => "crypto",
        }
    }

    /// Parse a method name; `None` for unknown names
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "card" => Some(PaymentMethod::Card),
            "iranian_card" => Some(PaymentMethod::IranianCard),
            "crypto" => Some(PaymentMethod::Crypto),
            _ => None,
        }
    }
}

/// The wallet operations core
///
/// Cheap to clone; clones share the same stores and rate cache and can be
/// used from many threads at once.
#[derive(Debug, Clone)]
pub struct WalletOperations {
    users: Arc<UserDirectory>,
    balances: Arc<BalanceStore>,
    ledger: Arc<dyn Ledger>,
    rates: Arc<RateProvider>,
    withdraw_fee: Decimal,
    withdraw_mode: WithdrawMode,
}

impl WalletOperations {
    /// Assemble the core from existing components
    pub fn new(
        users: Arc<UserDirectory>,
        balances: Arc<BalanceStore>,
        ledger: Arc<dyn Ledger>,
        rates: Arc<RateProvider>,
        config: &WalletConfig,
    ) -> Self {
        Self {
            users,
            balances,
            ledger,
            rates,
            withdraw_fee: config.withdraw_fee,
            withdraw_mode: config.withdraw_mode,
        }
    }

    /// In-memory stores plus the rate sources named in `config`
    pub fn from_config(config: &WalletConfig) -> Result<Self, WalletError> {
        Ok(Self::new(
            Arc::new(UserDirectory::new()),
            Arc::new(BalanceStore::new()),
            Arc::new(InMemoryLedger::new()),
            Arc::new(config.build_rate_provider()?),
            config,
        ))
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub fn ledger(&self) -> &dyn Ledger {
        self.ledger.as_ref()
    }

    // ----- reads -----

    /// Balance of one currency; zero if never written
    pub fn get_balance(&self, user: UserId, currency: Currency) -> Result<Decimal, WalletError> {
        self.balances.get_balance(user, currency)
    }

    /// Every materialized balance of one user
    pub fn balances(&self, user: UserId) -> Result<Vec<BalanceRow>, WalletError> {
        self.balances.balances(user)
    }

    /// Every materialized balance in the store
    pub fn all_balances(&self) -> Result<Vec<BalanceRow>, WalletError> {
        self.balances.snapshot()
    }

    /// The user's ledger rows, newest first
    pub fn history(&self, user: UserId, limit: usize) -> Result<Vec<LedgerEntry>, WalletError> {
        self.ledger.history(user, limit)
    }

    /// Current quote for one pair
    pub fn rate(&self, from: Currency, to: Currency) -> Result<RateQuote, WalletError> {
        self.rates.get_rate(from, to)
    }

    /// Current quotes for all supported pairs
    pub fn rates(&self) -> Result<Vec<RateQuote>, WalletError> {
        self.rates.rates()
    }

    // ----- users -----

    pub fn register(&self, handle: &str, password: Option<&str>) -> Result<User, WalletError> {
        self.users.register(handle, password)
    }

    pub fn login(&self, handle: &str, password: &str) -> Result<User, WalletError> {
        self.users.verify_credentials(handle, password)
    }

    fn require_user(&self, user: UserId) -> Result<User, WalletError> {
        self.users
            .get(user)
            .ok_or_else(|| WalletError::user_not_found(user))
    }

    // ----- mutations -----

    /// Add funds paid through `method`
    ///
    /// # Errors
    ///
    /// * `Validation` - non-positive amount or too many decimal places
    /// * `UserNotFound` - unknown user
    /// * `PersistenceFailure` / `ArithmeticOverflow` - recorded as a `failed`
    ///   charge row; the balance is unchanged
    pub fn charge(
        &self,
        user: UserId,
        amount: Decimal,
        currency: Currency,
        method: PaymentMethod,
        card_data: Option<&str>,
    ) -> Result<LedgerEntry, WalletError> {
        currency.validate_amount(amount)?;
        self.require_user(user)?;

        let mut metadata = json!({ "payment_method": method.as_str() });
        if method == PaymentMethod::Crypto {
            metadata["network"] = json!("TRC20");
        }
        if let Some(card) = card_data.filter(|c| !c.trim().is_empty()) {
            metadata["card_data"] = json!(card.trim());
        }
        let description = match currency {
            Currency::Usdt => "USDT deposit".to_string(),
            other => format!("Wallet charge - {}", other),
        };
        let entry = LedgerEntry::new(
            user,
            TransactionKind::Charge,
            amount,
            currency,
            TransactionStatus::Completed,
            description,
            metadata,
        );

        let result = self.balances.update(user, |wallet| {
            let mut next = wallet.clone();
            next.credit(currency, amount)?;
            self.ledger.append(vec![entry.clone()])?;
            *wallet = next;
            Ok(())
        });

        self.finish(entry, result)
    }

    /// Pay out to a card
    ///
    /// Under [`WithdrawMode::FeeInclusive`] the balance must cover
    /// `amount + fee`, the card must be 16 digits starting with `6`, and the
    /// row is recorded as `pending`. Under [`WithdrawMode::Simple`] exactly
    /// `amount` is debited and the row is `completed`.
    ///
    /// # Errors
    ///
    /// * `Validation` - bad amount, empty destination or malformed card
    /// * `InsufficientFunds` - balance below the total debit; nothing recorded
    pub fn withdraw(
        &self,
        user: UserId,
        amount: Decimal,
        currency: Currency,
        destination: &str,
    ) -> Result<LedgerEntry, WalletError> {
        currency.validate_amount(amount)?;
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(WalletError::validation("withdrawal destination is required"));
        }
        self.require_user(user)?;

        let description = format!("Withdrawal to card - {}", currency);
        let (total, status, metadata) = match self.withdraw_mode {
            WithdrawMode::Simple => (
                amount,
                TransactionStatus::Completed,
                json!({ "card_id": destination }),
            ),
            WithdrawMode::FeeInclusive => {
                validate_card(destination)?;
                let fee = currency.round_up(
                    amount
                        .checked_mul(self.withdraw_fee)
                        .ok_or_else(|| WalletError::arithmetic_overflow("withdrawal fee"))?,
                );
                let total = amount
                    .checked_add(fee)
                    .ok_or_else(|| WalletError::arithmetic_overflow("withdrawal total"))?;
                (
                    total,
                    TransactionStatus::Pending,
                    json!({ "card": mask_card(destination), "fee": fee, "total": total }),
                )
            }
        };

        let entry = LedgerEntry::new(
            user,
            TransactionKind::Withdraw,
            amount,
            currency,
            status,
            description,
            metadata,
        );

        let result = self.balances.update(user, |wallet| {
            let mut next = wallet.clone();
            next.debit(currency, total)?;
            self.ledger.append(vec![entry.clone()])?;
            *wallet = next;
            Ok(())
        });

        self.finish(entry, result)
    }

    /// Move funds to the user registered under `recipient_handle`
    ///
    /// Both wallets are locked (in user-id order) for the whole debit, credit
    /// and ledger append. No fee is charged: the sender's decrease equals the
    /// recipient's increase. Returns the sender's `send` row; the matching
    /// `receive` row is appended in the same ledger batch.
    ///
    /// # Errors
    ///
    /// * `Validation` - bad amount or transfer to self
    /// * `RecipientNotFound` - no user with that handle
    /// * `InsufficientFunds` - sender balance below amount; nothing recorded
    pub fn transfer(
        &self,
        from: UserId,
        recipient_handle: &str,
        amount: Decimal,
        currency: Currency,
        message: Option<&str>,
    ) -> Result<LedgerEntry, WalletError> {
        currency.validate_amount(amount)?;
        let sender = self.require_user(from)?;
        let recipient = self
            .users
            .find_by_handle(recipient_handle)
            .ok_or_else(|| WalletError::recipient_not_found(recipient_handle.trim()))?;
        if recipient.id == sender.id {
            return Err(WalletError::validation("cannot transfer to yourself"));
        }

        let message = message.map(str::trim).unwrap_or_default();
        let send = LedgerEntry::new(
            sender.id,
            TransactionKind::Send,
            amount,
            currency,
            TransactionStatus::Completed,
            format!("Transfer to {}", recipient.handle),
            json!({ "recipient": recipient.handle, "message": message }),
        );
        let receive = LedgerEntry::new(
            recipient.id,
            TransactionKind::Receive,
            amount,
            currency,
            TransactionStatus::Completed,
            format!("Transfer from {}", sender.handle),
            json!({ "sender": sender.handle, "message": message }),
        );

        let result = self
            .balances
            .update_pair(sender.id, recipient.id, |sender_wallet, recipient_wallet| {
                let mut next_sender = sender_wallet.clone();
                let mut next_recipient = recipient_wallet.clone();
                next_sender.debit(currency, amount)?;
                next_recipient.credit(currency, amount)?;
                self.ledger.append(vec![send.clone(), receive.clone()])?;
                *sender_wallet = next_sender;
                *recipient_wallet = next_recipient;
                Ok(())
            });

        self.finish(send, result)
    }

    /// Convert `amount` of `from` into `to` at the current rate, less the
    /// exchange fee
    ///
    /// ```text
    /// gross = round(amount * rate)   (to-currency scale; IRR sources divide by the USD rate)
    /// fee   = round(gross * fee)
    /// net   = gross - fee
    /// ```
    ///
    /// # Errors
    ///
    /// * `UnsupportedCurrencyPair` - `from == to`
    /// * `Validation` - bad amount, or nothing left after the fee
    /// * `InsufficientFunds` - `from` balance below amount; nothing recorded
    pub fn exchange(
        &self,
        user: UserId,
        from: Currency,
        to: Currency,
        amount: Decimal,
    ) -> Result<LedgerEntry, WalletError> {
        if from == to {
            return Err(WalletError::unsupported_pair(from, to));
        }
        from.validate_amount(amount)?;
        self.require_user(user)?;

        let quote = self.rates.get_rate(from, to)?;
        let conversion = Conversion::compute(amount, to, &quote)?;

        let entry = LedgerEntry::new(
            user,
            TransactionKind::Exchange,
            amount,
            from,
            TransactionStatus::Completed,
            format!("Exchange {} to {}", from, to),
            json!({
                "exchange_rate": quote.rate,
                "gross": conversion.gross,
                "fee": conversion.fee,
                "final_amount": conversion.net,
                "rate_source": quote.origin.to_string(),
            }),
        )
        .with_pair(from, to);

        let result = self.balances.update(user, |wallet| {
            let mut next = wallet.clone();
            next.debit(from, amount)?;
            next.credit(to, conversion.net)?;
            self.ledger.append(vec![entry.clone()])?;
            *wallet = next;
            Ok(())
        });

        self.finish(entry, result)
    }

    /// Log a committed entry, or record a `failed` row for mutation-phase
    /// failures
    fn finish(
        &self,
        entry: LedgerEntry,
        result: Result<(), WalletError>,
    ) -> Result<LedgerEntry, WalletError> {
        match result {
            Ok(()) => {
                tracing::info!(
                    tx = %entry.id,
                    user_id = %entry.user_id,
                    kind = entry.kind.as_str(),
                    amount = %entry.amount,
                    currency = %entry.currency,
                    status = entry.status.as_str(),
                    "operation committed"
                );
                Ok(entry)
            }
            Err(error @ WalletError::PersistenceFailure { .. })
            | Err(error @ WalletError::ArithmeticOverflow { .. }) => {
                let failed = entry.into_failed(&error.to_string());
                let failed_id = failed.id;
                match self.ledger.append(vec![failed]) {
                    Ok(_) => tracing::warn!(tx = %failed_id, error = %error, "operation failed, recorded as failed"),
                    Err(ledger_error) => tracing::error!(
                        error = %error,
                        ledger_error = %ledger_error,
                        "operation failed and could not be recorded"
                    ),
                }
                Err(error)
            }
            Err(error) => Err(error),
        }
    }
}

/// Amounts produced by one exchange
#[derive(Debug, Clone, Copy, PartialEq)]
struct Conversion {
    gross: Decimal,
    fee: Decimal,
    net: Decimal,
}

impl Conversion {
    fn compute(amount: Decimal, to: Currency, quote: &RateQuote) -> Result<Self, WalletError> {
        let gross = to.round(
            quote
                .convert(amount)
                .ok_or_else(|| WalletError::arithmetic_overflow("exchange conversion"))?,
        );
        let fee = to.round(
            gross
                .checked_mul(quote.fee)
                .ok_or_else(|| WalletError::arithmetic_overflow("exchange fee"))?,
        );
        let net = gross - fee;
        if net <= Decimal::ZERO {
            return Err(WalletError::validation(format!(
                "amount too small after fees: {} {} converts to {} {}",
                amount, quote.from, net, to
            )));
        }
        Ok(Self { gross, fee, net })
    }
}

/// Destination cards: exactly 16 ASCII digits, leading `6`
fn validate_card(card: &str) -> Result<(), WalletError> {
    if card.len() == 16 && card.bytes().all(|b| b.is_ascii_digit()) && card.starts_with('6') {
        Ok(())
    } else {
        Err(WalletError::validation(
            "card number must be 16 digits starting with 6",
        ))
    }
}

/// `6037991234561234` -> `6037********1234`
fn mask_card(card: &str) -> String {
    if card.len() <= 8 {
        return card.to_string();
    }
    format!(
        "{}{}{}",
        &card[..4],
        "*".repeat(card.len() - 8),
        &card[card.len() - 4..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::{FixedRateSource, RateSettings};
    use crate::types::TransactionId;
    use rstest::{fixture, rstest};
    use std::sync::Barrier;
    use std::thread;

    const CARD: &str = "6037991234561234";

    fn wallet_with(config: WalletConfig, ledger: Arc<dyn Ledger>) -> WalletOperations {
        let rates = RateProvider::new(
            vec![Box::new(FixedRateSource::new("fixed", Decimal::from(1_070_000)))],
            RateSettings::default(),
        );
        WalletOperations::new(
            Arc::new(UserDirectory::new()),
            Arc::new(BalanceStore::new()),
            ledger,
            Arc::new(rates),
            &config,
        )
    }

    #[fixture]
    fn wallet() -> WalletOperations {
        wallet_with(WalletConfig::default(), Arc::new(InMemoryLedger::new()))
    }

    fn funded(wallet: &WalletOperations, handle: &str, amount: i64, currency: Currency) -> UserId {
        let user = wallet.register(handle, None).unwrap();
        wallet
            .charge(
                user.id,
                Decimal::from(amount),
                currency,
                PaymentMethod::default_for(currency),
                None,
            )
            .unwrap();
        user.id
    }

    /// Ledger that refuses every non-failed row
    #[derive(Debug, Default)]
    struct RejectingLedger {
        inner: InMemoryLedger,
    }

    impl Ledger for RejectingLedger {
        fn append(&self, entries: Vec<LedgerEntry>) -> Result<Vec<TransactionId>, WalletError> {
            if entries.iter().any(|e| e.status != TransactionStatus::Failed) {
                return Err(WalletError::persistence("disk full"));
            }
            self.inner.append(entries)
        }

        fn get(&self, id: TransactionId) -> Result<Option<LedgerEntry>, WalletError> {
            self.inner.get(id)
        }

        fn history(&self, user: UserId, limit: usize) -> Result<Vec<LedgerEntry>, WalletError> {
            self.inner.history(user, limit)
        }

        fn entries(&self) -> Result<Vec<LedgerEntry>, WalletError> {
            self.inner.entries()
        }
    }

    // ----- charge -----

    #[rstest]
    #[case::usd(Currency::Usd, "card", None)]
    #[case::irr(Currency::Irr, "iranian_card", None)]
    #[case::usdt(Currency::Usdt, "crypto", Some("TRC20"))]
    fn test_charge_records_method_metadata(
        wallet: WalletOperations,
        #[case] currency: Currency,
        #[case] method: &str,
        #[case] network: Option<&str>,
    ) {
        let user = wallet.register("alice", None).unwrap();

        let entry = wallet
            .charge(
                user.id,
                Decimal::from(250),
                currency,
                PaymentMethod::default_for(currency),
                None,
            )
            .unwrap();

        assert_eq!(entry.kind, TransactionKind::Charge);
        assert_eq!(entry.status, TransactionStatus::Completed);
        assert_eq!(entry.metadata["payment_method"], method);
        assert_eq!(entry.metadata["network"].as_str(), network);
        assert_eq!(
            wallet.get_balance(user.id, currency).unwrap(),
            Decimal::from(250)
        );
        assert_eq!(wallet.ledger().get(entry.id).unwrap(), Some(entry));
    }

    #[rstest]
    #[case::zero(Decimal::ZERO)]
    #[case::negative(Decimal::from(-10))]
    #[case::sub_cent(Decimal::new(1, 3))]
    fn test_charge_rejects_invalid_amounts(wallet: WalletOperations, #[case] amount: Decimal) {
        let user = wallet.register("alice", None).unwrap();

        let err = wallet
            .charge(user.id, amount, Currency::Usd, PaymentMethod::Card, None)
            .unwrap_err();

        assert!(matches!(err, WalletError::Validation { .. }));
        assert!(wallet.ledger().entries().unwrap().is_empty());
        assert!(wallet.balances(user.id).unwrap().is_empty());
    }

    #[rstest]
    fn test_charge_unknown_user(wallet: WalletOperations) {
        let err = wallet
            .charge(
                uuid::Uuid::new_v4(),
                Decimal::ONE,
                Currency::Usd,
                PaymentMethod::Card,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, WalletError::UserNotFound { .. }));
    }

    #[test]
    fn test_charge_persistence_failure_records_failed_row() {
        let ledger = Arc::new(RejectingLedger::default());
        let wallet = wallet_with(WalletConfig::default(), ledger.clone());
        let user = wallet.register("alice", None).unwrap();

        let err = wallet
            .charge(
                user.id,
                Decimal::from(100),
                Currency::Usd,
                PaymentMethod::Card,
                Some("4111"),
            )
            .unwrap_err();

        assert_eq!(err, WalletError::persistence("disk full"));
        assert_eq!(wallet.get_balance(user.id, Currency::Usd).unwrap(), Decimal::ZERO);

        let rows = ledger.entries().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, TransactionStatus::Failed);
        assert_eq!(rows[0].kind, TransactionKind::Charge);
        assert_eq!(rows[0].metadata["error"], "Persistence failure: disk full");
    }

    // ----- withdraw -----

    #[rstest]
    fn test_fee_withdraw_of_entire_balance_fails(wallet: WalletOperations) {
        let user = funded(&wallet, "alice", 500, Currency::Usd);

        let err = wallet
            .withdraw(user, Decimal::from(500), Currency::Usd, CARD)
            .unwrap_err();

        assert_eq!(
            err,
            WalletError::insufficient_funds(Currency::Usd, Decimal::from(500), Decimal::from(505))
        );
        assert_eq!(wallet.get_balance(user, Currency::Usd).unwrap(), Decimal::from(500));
        assert!(wallet
            .history(user, 10)
            .unwrap()
            .iter()
            .all(|e| e.kind != TransactionKind::Withdraw));
    }

    #[rstest]
    fn test_fee_withdraw_debits_amount_plus_fee(wallet: WalletOperations) {
        let user = funded(&wallet, "alice", 1_000, Currency::Usd);

        let entry = wallet
            .withdraw(user, Decimal::from(200), Currency::Usd, CARD)
            .unwrap();

        assert_eq!(entry.status, TransactionStatus::Pending);
        assert_eq!(entry.amount, Decimal::from(200));
        assert_eq!(entry.metadata["card"], "6037********1234");
        assert_eq!(
            wallet.get_balance(user, Currency::Usd).unwrap(),
            Decimal::from(798)
        );
    }

    #[rstest]
    fn test_fee_withdraw_rounds_irr_fee(wallet: WalletOperations) {
        let user = funded(&wallet, "alice", 1_000_000, Currency::Irr);

        wallet
            .withdraw(user, Decimal::from(12_345), Currency::Irr, CARD)
            .unwrap();

        // 1% of 12,345 is 123.45, charged as 124 rial
        assert_eq!(
            wallet.get_balance(user, Currency::Irr).unwrap(),
            Decimal::from(1_000_000 - 12_345 - 124)
        );
    }

    #[rstest]
    #[case::irr_fee_below_one_rial(Currency::Irr, Decimal::from(49), Decimal::from(49), Decimal::from(50))]
    #[case::irr_fractional_fee(Currency::Irr, Decimal::from(12_468), Decimal::from(12_345), Decimal::from(12_469))]
    #[case::one_cent(Currency::Usd, Decimal::new(1, 2), Decimal::new(1, 2), Decimal::new(2, 2))]
    fn test_fee_withdraw_rounds_fee_up(
        wallet: WalletOperations,
        #[case] currency: Currency,
        #[case] balance: Decimal,
        #[case] amount: Decimal,
        #[case] required: Decimal,
    ) {
        let user = wallet.register("alice", None).unwrap().id;
        wallet
            .charge(user, balance, currency, PaymentMethod::default_for(currency), None)
            .unwrap();

        let err = wallet.withdraw(user, amount, currency, CARD).unwrap_err();

        assert_eq!(err, WalletError::insufficient_funds(currency, balance, required));
        assert_eq!(wallet.get_balance(user, currency).unwrap(), balance);
    }

    #[rstest]
    #[case::too_short("603799123456")]
    #[case::wrong_prefix("4111111111111111")]
    #[case::letters("6037abcd12345678")]
    #[case::seventeen("60379912345612345")]
    fn test_fee_withdraw_validates_card(wallet: WalletOperations, #[case] card: &str) {
        let user = funded(&wallet, "alice", 1_000, Currency::Usd);

        let err = wallet
            .withdraw(user, Decimal::from(10), Currency::Usd, card)
            .unwrap_err();

        assert!(matches!(err, WalletError::Validation { .. }));
        assert_eq!(wallet.get_balance(user, Currency::Usd).unwrap(), Decimal::from(1_000));
    }

    #[test]
    fn test_simple_withdraw_allows_entire_balance() {
        let config = WalletConfig {
            withdraw_mode: WithdrawMode::Simple,
            ..WalletConfig::default()
        };
        let wallet = wallet_with(config, Arc::new(InMemoryLedger::new()));
        let user = funded(&wallet, "alice", 500, Currency::Usd);

        let entry = wallet
            .withdraw(user, Decimal::from(500), Currency::Usd, "card-17")
            .unwrap();

        assert_eq!(entry.status, TransactionStatus::Completed);
        assert_eq!(entry.metadata["card_id"], "card-17");
        assert_eq!(wallet.get_balance(user, Currency::Usd).unwrap(), Decimal::ZERO);
    }

    #[rstest]
    fn test_withdraw_requires_destination(wallet: WalletOperations) {
        let user = funded(&wallet, "alice", 100, Currency::Usd);
        assert!(matches!(
            wallet.withdraw(user, Decimal::ONE, Currency::Usd, "  "),
            Err(WalletError::Validation { .. })
        ));
    }

    #[test]
    fn test_concurrent_full_balance_withdrawals_one_wins() {
        let config = WalletConfig {
            withdraw_mode: WithdrawMode::Simple,
            ..WalletConfig::default()
        };
        let wallet = wallet_with(config, Arc::new(InMemoryLedger::new()));
        let user = funded(&wallet, "alice", 1_000, Currency::Usd);
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let wallet = wallet.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    wallet.withdraw(user, Decimal::from(1_000), Currency::Usd, "card-1")
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let insufficient = results
            .iter()
            .filter(|r| matches!(r, Err(WalletError::InsufficientFunds { .. })))
            .count();

        assert_eq!(successes, 1);
        assert_eq!(insufficient, 1);
        assert_eq!(wallet.get_balance(user, Currency::Usd).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_many_concurrent_withdrawals_never_overdraw() {
        let config = WalletConfig {
            withdraw_mode: WithdrawMode::Simple,
            ..WalletConfig::default()
        };
        let wallet = wallet_with(config, Arc::new(InMemoryLedger::new()));
        let user = funded(&wallet, "alice", 1_000, Currency::Usd);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let wallet = wallet.clone();
                thread::spawn(move || {
                    (0..10)
                        .filter(|_| {
                            wallet
                                .withdraw(user, Decimal::from(10), Currency::Usd, "card-1")
                                .is_ok()
                        })
                        .count()
                })
            })
            .collect();

        let successes: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(successes, 100);
        assert_eq!(wallet.get_balance(user, Currency::Usd).unwrap(), Decimal::ZERO);
    }

    // ----- transfer -----

    #[rstest]
    fn test_transfer_conserves_balance(wallet: WalletOperations) {
        let alice = funded(&wallet, "alice@example.com", 300, Currency::Usd);
        let bob = wallet.register("bob@example.com", None).unwrap().id;

        let send = wallet
            .transfer(alice, "BOB@example.com", Decimal::new(12550, 2), Currency::Usd, Some("rent"))
            .unwrap();

        assert_eq!(send.kind, TransactionKind::Send);
        assert_eq!(send.metadata["recipient"], "bob@example.com");
        assert_eq!(send.metadata["message"], "rent");
        assert_eq!(wallet.get_balance(alice, Currency::Usd).unwrap(), Decimal::new(17450, 2));
        assert_eq!(wallet.get_balance(bob, Currency::Usd).unwrap(), Decimal::new(12550, 2));

        let received = wallet.history(bob, 1).unwrap();
        assert_eq!(received[0].kind, TransactionKind::Receive);
        assert_eq!(received[0].amount, send.amount);
        assert_eq!(received[0].metadata["sender"], "alice@example.com");
        assert_eq!(received[0].metadata["message"], "rent");
    }

    #[rstest]
    fn test_transfer_unknown_recipient(wallet: WalletOperations) {
        let alice = funded(&wallet, "alice", 100, Currency::Usd);

        let err = wallet
            .transfer(alice, "ghost", Decimal::ONE, Currency::Usd, None)
            .unwrap_err();

        assert_eq!(err, WalletError::recipient_not_found("ghost"));
        assert_eq!(wallet.get_balance(alice, Currency::Usd).unwrap(), Decimal::from(100));
    }

    #[rstest]
    fn test_transfer_to_self_is_rejected(wallet: WalletOperations) {
        let alice = funded(&wallet, "alice", 100, Currency::Usd);
        assert!(matches!(
            wallet.transfer(alice, "alice", Decimal::ONE, Currency::Usd, None),
            Err(WalletError::Validation { .. })
        ));
    }

    #[rstest]
    fn test_transfer_insufficient_funds_touches_nothing(wallet: WalletOperations) {
        let alice = funded(&wallet, "alice", 100, Currency::Usd);
        let bob = wallet.register("bob", None).unwrap().id;
        let rows_before = wallet.ledger().entries().unwrap().len();

        let err = wallet
            .transfer(alice, "bob", Decimal::from(101), Currency::Usd, None)
            .unwrap_err();

        assert!(matches!(err, WalletError::InsufficientFunds { .. }));
        assert_eq!(wallet.get_balance(alice, Currency::Usd).unwrap(), Decimal::from(100));
        assert!(wallet.balances(bob).unwrap().is_empty());
        assert_eq!(wallet.ledger().entries().unwrap().len(), rows_before);
    }

    #[test]
    fn test_opposing_concurrent_transfers_conserve_total() {
        let wallet = wallet_with(WalletConfig::default(), Arc::new(InMemoryLedger::new()));
        let alice = funded(&wallet, "alice", 500, Currency::Usdt);
        let bob = funded(&wallet, "bob", 500, Currency::Usdt);

        let handles: Vec<_> = [(alice, "bob"), (bob, "alice")]
            .into_iter()
            .map(|(from, to)| {
                let wallet = wallet.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        let _ = wallet.transfer(from, to, Decimal::from(7), Currency::Usdt, None);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let total = wallet.get_balance(alice, Currency::Usdt).unwrap()
            + wallet.get_balance(bob, Currency::Usdt).unwrap();
        assert_eq!(total, Decimal::from(1_000));
    }

    // ----- exchange -----

    #[rstest]
    fn test_exchange_usd_to_irr_example(wallet: WalletOperations) {
        let user = funded(&wallet, "alice", 1_000, Currency::Usd);

        let entry = wallet
            .exchange(user, Currency::Usd, Currency::Irr, Decimal::from(100))
            .unwrap();

        assert_eq!(entry.from_currency, Some(Currency::Usd));
        assert_eq!(entry.to_currency, Some(Currency::Irr));
        assert_eq!(entry.metadata["gross"], "107000000");
        assert_eq!(entry.metadata["fee"], "535000");
        assert_eq!(entry.metadata["final_amount"], "106465000");
        assert_eq!(entry.metadata["rate_source"], "live:fixed");
        assert_eq!(wallet.get_balance(user, Currency::Usd).unwrap(), Decimal::from(900));
        assert_eq!(
            wallet.get_balance(user, Currency::Irr).unwrap(),
            Decimal::from(106_465_000)
        );
        assert_eq!(wallet.get_balance(user, Currency::Usdt).unwrap(), Decimal::ZERO);
    }

    #[rstest]
    fn test_round_trip_exchange_erodes_balance(wallet: WalletOperations) {
        let user = funded(&wallet, "alice", 1_000, Currency::Usd);

        wallet
            .exchange(user, Currency::Usd, Currency::Irr, Decimal::from(100))
            .unwrap();
        let net = wallet.get_balance(user, Currency::Irr).unwrap();
        wallet
            .exchange(user, Currency::Irr, Currency::Usd, net)
            .unwrap();

        let final_usd = wallet.get_balance(user, Currency::Usd).unwrap();
        assert!(final_usd < Decimal::from(1_000));
        // 106,465,000 IRR -> 99.50 gross, 0.50 fee, 99.00 net
        assert_eq!(final_usd, Decimal::from(999));
        assert_eq!(wallet.get_balance(user, Currency::Irr).unwrap(), Decimal::ZERO);
    }

    #[rstest]
    fn test_exchange_from_irr_rounds_exact_midpoint_to_even(wallet: WalletOperations) {
        let user = funded(&wallet, "alice", 144_450, Currency::Irr);

        // 144,450 / 1,070,000 is exactly 0.135
        let entry = wallet
            .exchange(user, Currency::Irr, Currency::Usd, Decimal::from(144_450))
            .unwrap();

        assert_eq!(entry.metadata["gross"], "0.14");
        assert_eq!(wallet.get_balance(user, Currency::Usd).unwrap(), Decimal::new(14, 2));
        assert_eq!(wallet.get_balance(user, Currency::Irr).unwrap(), Decimal::ZERO);
    }

    #[rstest]
    fn test_exchange_usd_usdt_is_pinned(wallet: WalletOperations) {
        let user = funded(&wallet, "alice", 200, Currency::Usd);

        wallet
            .exchange(user, Currency::Usd, Currency::Usdt, Decimal::from(200))
            .unwrap();

        assert_eq!(wallet.get_balance(user, Currency::Usdt).unwrap(), Decimal::from(199));
        assert_eq!(wallet.get_balance(user, Currency::Usd).unwrap(), Decimal::ZERO);
    }

    #[rstest]
    fn test_exchange_same_currency_is_unsupported(wallet: WalletOperations) {
        let user = funded(&wallet, "alice", 100, Currency::Usd);
        assert_eq!(
            wallet.exchange(user, Currency::Usd, Currency::Usd, Decimal::ONE),
            Err(WalletError::unsupported_pair(Currency::Usd, Currency::Usd))
        );
    }

    #[rstest]
    fn test_exchange_insufficient_funds(wallet: WalletOperations) {
        let user = funded(&wallet, "alice", 50, Currency::Usd);

        let err = wallet
            .exchange(user, Currency::Usd, Currency::Irr, Decimal::from(51))
            .unwrap_err();

        assert!(matches!(err, WalletError::InsufficientFunds { .. }));
        assert_eq!(wallet.get_balance(user, Currency::Usd).unwrap(), Decimal::from(50));
        assert_eq!(wallet.get_balance(user, Currency::Irr).unwrap(), Decimal::ZERO);
        assert!(wallet.balances(user).unwrap().iter().all(|r| r.currency != Currency::Irr));
    }

    #[rstest]
    fn test_exchange_dust_is_rejected(wallet: WalletOperations) {
        let user = funded(&wallet, "alice", 10, Currency::Irr);

        // 1 IRR is a tiny fraction of a cent
        let err = wallet
            .exchange(user, Currency::Irr, Currency::Usd, Decimal::ONE)
            .unwrap_err();

        assert!(matches!(err, WalletError::Validation { .. }));
        assert_eq!(wallet.get_balance(user, Currency::Irr).unwrap(), Decimal::from(10));
    }

    #[test]
    fn test_exchange_persistence_failure_leaves_balances() {
        let ledger = Arc::new(RejectingLedger::default());
        let wallet = wallet_with(WalletConfig::default(), ledger.clone());
        let user = wallet.register("alice", None).unwrap().id;
        // Seed the balance directly; the rejecting ledger blocks charges
        wallet
            .balances
            .adjust_balance(user, Currency::Usd, Decimal::from(100))
            .unwrap();

        let err = wallet
            .exchange(user, Currency::Usd, Currency::Irr, Decimal::from(10))
            .unwrap_err();

        assert!(matches!(err, WalletError::PersistenceFailure { .. }));
        assert_eq!(wallet.get_balance(user, Currency::Usd).unwrap(), Decimal::from(100));
        assert_eq!(wallet.get_balance(user, Currency::Irr).unwrap(), Decimal::ZERO);
        let rows = ledger.entries().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, TransactionStatus::Failed);
        assert_eq!(rows[0].kind, TransactionKind::Exchange);
    }

    // ----- reads -----

    #[rstest]
    fn test_history_newest_first(wallet: WalletOperations) {
        let user = funded(&wallet, "alice", 1_000, Currency::Usd);
        wallet
            .exchange(user, Currency::Usd, Currency::Irr, Decimal::from(10))
            .unwrap();
        wallet
            .withdraw(user, Decimal::from(10), Currency::Usd, CARD)
            .unwrap();

        let kinds: Vec<_> = wallet
            .history(user, 10)
            .unwrap()
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TransactionKind::Withdraw,
                TransactionKind::Exchange,
                TransactionKind::Charge
            ]
        );
        assert_eq!(wallet.history(user, 2).unwrap().len(), 2);
    }

    #[rstest]
    fn test_login_through_core(wallet: WalletOperations) {
        let user = wallet.register("erin@example.com", Some("s3cret")).unwrap();
        assert_eq!(wallet.login("erin@example.com", "s3cret").unwrap().id, user.id);
        assert_eq!(
            wallet.login("erin@example.com", "nope"),
            Err(WalletError::InvalidCredentials)
        );
    }

    #[test]
    fn test_mask_card() {
        assert_eq!(mask_card("6037991234561234"), "6037********1234");
        assert_eq!(mask_card("1234"), "1234");
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!(PaymentMethod::parse("Crypto"), Some(PaymentMethod::Crypto));
        assert_eq!(PaymentMethod::parse("iranian_card"), Some(PaymentMethod::IranianCard));
        assert_eq!(PaymentMethod::parse("paypal"), None);
    }
}
