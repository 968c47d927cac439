//! Exchange rates
//!
//! - `source` - The [`RateSource`] capability and a fixed-rate implementation
//! - `http` - HTTP JSON source with a request timeout
//! - `provider` - TTL-cached [`RateProvider`] with validation and fallback

pub mod http;
pub mod provider;
pub mod source;

pub use http::HttpRateSource;
pub use provider::{RateOrigin, RateProvider, RateQuote, RateSettings};
pub use source::{FixedRateSource, RateSource};
