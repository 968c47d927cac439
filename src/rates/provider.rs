//! Cached rate provider
//!
//! The provider asks its sources for the USD→IRR rate, validates the
//! answer, and keeps a single snapshot covering every supported pair for a
//! fixed TTL. It never hands out a non-positive rate: when every source
//! fails it re-serves the last good snapshot, and when there has never been
//! one it uses a configured fallback constant.
//!
//! # Pair mapping
//!
//! ```text
//! USD  -> USDT  1
//! USDT -> USD   1
//! USD  -> IRR   r
//! USDT -> IRR   r
//! IRR  -> USD   1/r
//! IRR  -> USDT  1/r
//! ```

use super::source::RateSource;
use crate::types::{Currency, WalletError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Where a quote's rate came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "source", rename_all = "lowercase")]
pub enum RateOrigin {
    /// Fetched from the named source during this call
    Live(String),
    /// Served from a snapshot that is still within its TTL
    Cached(String),
    /// Refresh failed; last known good value from the named source
    Stale(String),
    /// No source has ever produced a valid rate
    Fallback,
}

impl fmt::Display for RateOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateOrigin::Live(source) => write!(f, "live:{}", source),
            RateOrigin::Cached(source) => write!(f, "cached:{}", source),
            RateOrigin::Stale(source) => write!(f, "stale:{}", source),
            RateOrigin::Fallback => f.write_str("fallback"),
        }
    }
}

/// Conversion rate for one currency pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateQuote {
    pub from: Currency,
    pub to: Currency,
    /// Units of `to` per unit of `from`; always positive
    pub rate: Decimal,
    /// Exchange fee fraction applied to the converted amount
    pub fee: Decimal,
    pub origin: RateOrigin,
    /// When the underlying USD→IRR figure was obtained
    pub quoted_at: DateTime<Utc>,
    /// USD→IRR figure `rate` was derived from
    #[serde(skip)]
    pub usd_irr: Decimal,
}

impl RateQuote {
    /// Convert `amount` of `from` into `to`, before rounding or fees
    ///
    /// IRR amounts are divided by the USD→IRR rate rather than multiplied
    /// by the truncated reciprocal in `rate`, so exact midpoints stay exact.
    pub fn convert(&self, amount: Decimal) -> Option<Decimal> {
        match self.from {
            Currency::Irr => amount.checked_div(self.usd_irr),
            _ => amount.checked_mul(self.rate),
        }
    }
}

/// Tunables for [`RateProvider`]
#[derive(Debug, Clone, PartialEq)]
pub struct RateSettings {
    /// How long a snapshot is served before the sources are asked again
    pub ttl: Duration,
    /// USD→IRR rate used when no source has ever succeeded
    pub fallback_usd_irr: Decimal,
    /// Exclusive lower bound for a plausible USD→IRR rate
    pub min_usd_irr: Decimal,
    /// Exclusive upper bound for a plausible USD→IRR rate
    pub max_usd_irr: Decimal,
    /// Fee fraction attached to every quote
    pub exchange_fee: Decimal,
}

impl Default for RateSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            fallback_usd_irr: Decimal::from(1_070_000),
            min_usd_irr: Decimal::from(500_000),
            max_usd_irr: Decimal::from(2_000_000),
            exchange_fee: Decimal::new(5, 3),
        }
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    usd_irr: Decimal,
    /// Name of the source that produced `usd_irr`; `None` for the fallback
    source: Option<String>,
    quoted_at: DateTime<Utc>,
    refreshed: Instant,
}

impl Snapshot {
    fn rate(&self, from: Currency, to: Currency) -> Result<Decimal, WalletError> {
        match (from, to) {
            (Currency::Usd, Currency::Usdt) | (Currency::Usdt, Currency::Usd) => Ok(Decimal::ONE),
            (Currency::Usd, Currency::Irr) | (Currency::Usdt, Currency::Irr) => Ok(self.usd_irr),
            (Currency::Irr, Currency::Usd) | (Currency::Irr, Currency::Usdt) => Decimal::ONE
                .checked_div(self.usd_irr)
                .ok_or_else(|| WalletError::arithmetic_overflow("rate inversion")),
            _ => Err(WalletError::unsupported_pair(from, to)),
        }
    }
}

/// Process-wide rate cache in front of a list of [`RateSource`]s
///
/// Shared by reference (usually inside an `Arc`). The cache mutex is held
/// across a refresh so concurrent callers wait for one fetch instead of
/// each hitting the sources.
pub struct RateProvider {
    sources: Vec<Box<dyn RateSource>>,
    settings: RateSettings,
    cache: Mutex<Option<Snapshot>>,
}

impl fmt::Debug for RateProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateProvider")
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("settings", &self.settings)
            .finish()
    }
}

impl RateProvider {
    /// Create a provider that tries `sources` in order
    ///
    /// An empty source list is valid: every quote then uses the fallback.
    pub fn new(sources: Vec<Box<dyn RateSource>>, settings: RateSettings) -> Self {
        Self {
            sources,
            settings,
            cache: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &RateSettings {
        &self.settings
    }

    /// Quote a conversion from `from` to `to`
    ///
    /// # Errors
    ///
    /// * `UnsupportedCurrencyPair` - `from == to`
    ///
    /// Source failures never surface here.
    pub fn get_rate(&self, from: Currency, to: Currency) -> Result<RateQuote, WalletError> {
        if from == to {
            return Err(WalletError::unsupported_pair(from, to));
        }
        let (snapshot, origin) = self.current()?;
        self.quote(&snapshot, origin, from, to)
    }

    /// Quotes for every supported pair, from one snapshot
    pub fn rates(&self) -> Result<Vec<RateQuote>, WalletError> {
        let (snapshot, origin) = self.current()?;
        let mut quotes = Vec::with_capacity(6);
        for from in Currency::ALL {
            for to in Currency::ALL {
                if from != to {
                    quotes.push(self.quote(&snapshot, origin.clone(), from, to)?);
                }
            }
        }
        Ok(quotes)
    }

    fn quote(
        &self,
        snapshot: &Snapshot,
        origin: RateOrigin,
        from: Currency,
        to: Currency,
    ) -> Result<RateQuote, WalletError> {
        Ok(RateQuote {
            from,
            to,
            rate: snapshot.rate(from, to)?,
            fee: self.settings.exchange_fee,
            origin,
            quoted_at: snapshot.quoted_at,
            usd_irr: snapshot.usd_irr,
        })
    }

    fn lock_cache(&self) -> Result<MutexGuard<'_, Option<Snapshot>>, WalletError> {
        self.cache
            .lock()
            .map_err(|_| WalletError::persistence("rate cache lock poisoned"))
    }

    /// Return a snapshot no older than the TTL, refreshing if needed
    fn current(&self) -> Result<(Snapshot, RateOrigin), WalletError> {
        let mut cache = self.lock_cache()?;

        if let Some(snapshot) = cache.as_ref() {
            if snapshot.refreshed.elapsed() < self.settings.ttl {
                tracing::debug!(usd_irr = %snapshot.usd_irr, "rate cache hit");
                let origin = match &snapshot.source {
                    Some(source) => RateOrigin::Cached(source.clone()),
                    None => RateOrigin::Fallback,
                };
                return Ok((snapshot.clone(), origin));
            }
        }

        if let Some((source, usd_irr)) = self.fetch() {
            let snapshot = Snapshot {
                usd_irr,
                source: Some(source.clone()),
                quoted_at: Utc::now(),
                refreshed: Instant::now(),
            };
            *cache = Some(snapshot.clone());
            return Ok((snapshot, RateOrigin::Live(source)));
        }

        // Every source failed. Keep serving the last good value, re-armed for
        // one more TTL so the sources aren't hammered on every call.
        if let Some(previous) = cache.as_mut().filter(|s| s.source.is_some()) {
            previous.refreshed = Instant::now();
            let source = previous.source.clone().unwrap_or_default();
            tracing::warn!(usd_irr = %previous.usd_irr, source = %source, "rate refresh failed, serving last known good rate");
            return Ok((previous.clone(), RateOrigin::Stale(source)));
        }

        tracing::warn!(
            usd_irr = %self.settings.fallback_usd_irr,
            "no rate source available, using fallback rate"
        );
        let snapshot = Snapshot {
            usd_irr: self.settings.fallback_usd_irr,
            source: None,
            quoted_at: Utc::now(),
            refreshed: Instant::now(),
        };
        *cache = Some(snapshot.clone());
        Ok((snapshot, RateOrigin::Fallback))
    }

    /// First plausible rate from the sources, in order
    fn fetch(&self) -> Option<(String, Decimal)> {
        for source in &self.sources {
            match source.fetch_usd_irr().and_then(|rate| self.validate(source.name(), rate)) {
                Ok(rate) => {
                    tracing::info!(source = source.name(), usd_irr = %rate, "fetched USD/IRR rate");
                    return Some((source.name().to_string(), rate));
                }
                Err(e) => tracing::warn!(source = source.name(), error = %e, "rate source failed"),
            }
        }
        None
    }

    fn validate(&self, source_name: &str, rate: Decimal) -> Result<Decimal, WalletError> {
        if rate > self.settings.min_usd_irr && rate < self.settings.max_usd_irr {
            Ok(rate)
        } else {
            Err(WalletError::rate_unavailable(
                source_name,
                format!(
                    "rate {} outside plausible range ({}, {})",
                    rate, self.settings.min_usd_irr, self.settings.max_usd_irr
                ),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::FixedRateSource;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Source that replays a script of results and counts calls
    struct ScriptedSource {
        name: &'static str,
        script: Mutex<Vec<Result<Decimal, WalletError>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(name: &'static str, mut script: Vec<Result<Decimal, WalletError>>) -> (Self, Arc<AtomicUsize>) {
            script.reverse();
            let calls = Arc::new(AtomicUsize::new(0));
            let source = Self {
                name,
                script: Mutex::new(script),
                calls: Arc::clone(&calls),
            };
            (source, calls)
        }
    }

    impl RateSource for ScriptedSource {
        fn name(&self) -> &str {
            self.name
        }

        fn fetch_usd_irr(&self) -> Result<Decimal, WalletError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(WalletError::rate_unavailable(self.name, "script exhausted")))
        }
    }

    fn down(name: &str) -> Result<Decimal, WalletError> {
        Err(WalletError::rate_unavailable(name, "connection refused"))
    }

    fn no_ttl() -> RateSettings {
        RateSettings {
            ttl: Duration::ZERO,
            ..RateSettings::default()
        }
    }

    #[rstest]
    #[case::usd_irr(Currency::Usd, Currency::Irr, Decimal::from(1_070_000))]
    #[case::usdt_irr(Currency::Usdt, Currency::Irr, Decimal::from(1_070_000))]
    #[case::usd_usdt(Currency::Usd, Currency::Usdt, Decimal::ONE)]
    #[case::usdt_usd(Currency::Usdt, Currency::Usd, Decimal::ONE)]
    fn test_pair_mapping(#[case] from: Currency, #[case] to: Currency, #[case] expected: Decimal) {
        let provider = RateProvider::new(
            vec![Box::new(FixedRateSource::new("fixed", Decimal::from(1_070_000)))],
            RateSettings::default(),
        );

        let quote = provider.get_rate(from, to).unwrap();
        assert_eq!(quote.rate, expected);
        assert_eq!(quote.fee, Decimal::new(5, 3));
        assert_eq!(quote.origin, RateOrigin::Live("fixed".to_string()));
    }

    #[test]
    fn test_irr_rates_are_inverse() {
        let provider = RateProvider::new(
            vec![Box::new(FixedRateSource::new("fixed", Decimal::from(1_000_000)))],
            RateSettings::default(),
        );

        let quote = provider.get_rate(Currency::Irr, Currency::Usd).unwrap();
        assert_eq!(quote.rate, Decimal::new(1, 6));
    }

    #[test]
    fn test_irr_conversion_divides_by_usd_rate() {
        let provider = RateProvider::new(
            vec![Box::new(FixedRateSource::new("fixed", Decimal::from(1_070_000)))],
            RateSettings::default(),
        );

        let quote = provider.get_rate(Currency::Irr, Currency::Usdt).unwrap();
        assert_eq!(quote.convert(Decimal::from(144_450)), Some(Decimal::new(135, 3)));

        let quote = provider.get_rate(Currency::Usd, Currency::Irr).unwrap();
        assert_eq!(quote.convert(Decimal::new(135, 3)), Some(Decimal::from(144_450)));
    }

    #[rstest]
    #[case::usd(Currency::Usd)]
    #[case::irr(Currency::Irr)]
    fn test_same_currency_is_unsupported(#[case] currency: Currency) {
        let provider = RateProvider::new(Vec::new(), RateSettings::default());
        assert_eq!(
            provider.get_rate(currency, currency),
            Err(WalletError::unsupported_pair(currency, currency))
        );
    }

    #[test]
    fn test_cache_serves_within_ttl() {
        let (source, calls) = ScriptedSource::new("live", vec![Ok(Decimal::from(1_100_000))]);
        let provider = RateProvider::new(vec![Box::new(source)], RateSettings::default());

        let first = provider.get_rate(Currency::Usd, Currency::Irr).unwrap();
        let second = provider.get_rate(Currency::Usdt, Currency::Irr).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.origin, RateOrigin::Live("live".to_string()));
        assert_eq!(second.origin, RateOrigin::Cached("live".to_string()));
        assert_eq!(second.rate, Decimal::from(1_100_000));
    }

    #[test]
    fn test_expired_cache_refetches() {
        let (source, calls) = ScriptedSource::new(
            "live",
            vec![Ok(Decimal::from(1_100_000)), Ok(Decimal::from(1_200_000))],
        );
        let provider = RateProvider::new(vec![Box::new(source)], no_ttl());

        provider.get_rate(Currency::Usd, Currency::Irr).unwrap();
        let second = provider.get_rate(Currency::Usd, Currency::Irr).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(second.rate, Decimal::from(1_200_000));
    }

    #[test]
    fn test_failing_source_falls_through_to_next() {
        let (primary, _) = ScriptedSource::new("primary", vec![down("primary")]);
        let (secondary, _) = ScriptedSource::new("secondary", vec![Ok(Decimal::from(1_050_000))]);
        let provider = RateProvider::new(
            vec![Box::new(primary), Box::new(secondary)],
            RateSettings::default(),
        );

        let quote = provider.get_rate(Currency::Usd, Currency::Irr).unwrap();
        assert_eq!(quote.rate, Decimal::from(1_050_000));
        assert_eq!(quote.origin, RateOrigin::Live("secondary".to_string()));
    }

    #[rstest]
    #[case::too_low(Decimal::from(500_000))]
    #[case::too_high(Decimal::from(2_000_000))]
    #[case::zero(Decimal::ZERO)]
    #[case::negative(Decimal::from(-1_070_000))]
    fn test_out_of_range_rates_are_rejected(#[case] bogus: Decimal) {
        let (source, _) = ScriptedSource::new("live", vec![Ok(bogus)]);
        let provider = RateProvider::new(vec![Box::new(source)], RateSettings::default());

        let quote = provider.get_rate(Currency::Usd, Currency::Irr).unwrap();
        assert_eq!(quote.origin, RateOrigin::Fallback);
        assert_eq!(quote.rate, Decimal::from(1_070_000));
    }

    #[test]
    fn test_last_known_good_survives_outage() {
        let (source, _) = ScriptedSource::new(
            "live",
            vec![Ok(Decimal::from(1_090_000)), down("live")],
        );
        let provider = RateProvider::new(vec![Box::new(source)], no_ttl());

        provider.get_rate(Currency::Usd, Currency::Irr).unwrap();
        let quote = provider.get_rate(Currency::Usd, Currency::Irr).unwrap();

        assert_eq!(quote.rate, Decimal::from(1_090_000));
        assert_eq!(quote.origin, RateOrigin::Stale("live".to_string()));
    }

    #[test]
    fn test_fallback_without_sources() {
        let provider = RateProvider::new(Vec::new(), RateSettings::default());

        let quote = provider.get_rate(Currency::Usd, Currency::Irr).unwrap();
        assert_eq!(quote.rate, Decimal::from(1_070_000));
        assert_eq!(quote.origin, RateOrigin::Fallback);
        assert!(quote.rate > Decimal::ZERO);
    }

    #[test]
    fn test_rates_lists_all_six_pairs() {
        let provider = RateProvider::new(Vec::new(), RateSettings::default());
        let quotes = provider.rates().unwrap();

        assert_eq!(quotes.len(), 6);
        assert!(quotes.iter().all(|q| q.from != q.to && q.rate > Decimal::ZERO));
    }

    #[test]
    fn test_concurrent_callers_share_one_fetch() {
        let (source, calls) = ScriptedSource::new("live", vec![Ok(Decimal::from(1_070_000))]);
        let provider = Arc::new(RateProvider::new(vec![Box::new(source)], RateSettings::default()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                std::thread::spawn(move || provider.get_rate(Currency::Usd, Currency::Irr).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().rate, Decimal::from(1_070_000));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
