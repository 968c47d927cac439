//! HTTP JSON rate source
//!
//! Queries a market-data endpoint and pulls the USD→IRR figure out of the
//! JSON body with a JSON pointer (RFC 6901), e.g. `/current/price_dollar_rl/p`.

use super::source::{parse_rate_text, RateSource};
use crate::types::WalletError;
use reqwest::blocking::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;

/// Rate source backed by an HTTP endpoint returning JSON
#[derive(Debug, Clone)]
pub struct HttpRateSource {
    name: String,
    url: String,
    pointer: String,
    client: Client,
}

impl HttpRateSource {
    /// Build a source with a bounded request timeout
    ///
    /// # Errors
    ///
    /// Returns `Config` if the HTTP client cannot be constructed (TLS backend
    /// initialisation failure).
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        pointer: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, WalletError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wallet-engine/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WalletError::config("rate source http client", e.to_string()))?;

        Ok(Self {
            name: name.into(),
            url: url.into(),
            pointer: pointer.into(),
            client,
        })
    }
}

impl RateSource for HttpRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_usd_irr(&self) -> Result<Decimal, WalletError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|e| WalletError::rate_unavailable(&self.name, e.to_string()))?;

        let body: Value = response
            .json()
            .map_err(|e| WalletError::rate_unavailable(&self.name, format!("malformed body: {}", e)))?;

        extract_rate(&self.name, &body, &self.pointer)
    }
}

/// Read the rate at `pointer` from a JSON document
///
/// The value may be a JSON number or a numeric string.
pub fn extract_rate(source_name: &str, body: &Value, pointer: &str) -> Result<Decimal, WalletError> {
    match body.pointer(pointer) {
        Some(Value::Number(number)) => number
            .as_f64()
            .filter(|value| value.is_finite())
            .and_then(Decimal::from_f64)
            .ok_or_else(|| {
                WalletError::rate_unavailable(source_name, format!("non-finite rate {}", number))
            }),
        Some(Value::String(text)) => parse_rate_text(source_name, text),
        Some(other) => Err(WalletError::rate_unavailable(
            source_name,
            format!("unexpected value at {}: {}", pointer, other),
        )),
        None => Err(WalletError::rate_unavailable(
            source_name,
            format!("no value at {}", pointer),
        )),
    }
}
