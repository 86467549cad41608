#![forbid(unsafe_code)]

//! Tunables shared by the scenarios and the checkout view-model.

use web_time::Duration;

use crate::currency::{Currency, Quote};

/// Endpoint the mock rate table is served from.
pub const RATES_ENDPOINT: &str = "mock://exchangerates";

/// Configuration for a demo run.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Quiet period before a currency selection takes effect.
    /// Default: 500ms.
    pub debounce: Duration,

    /// Artificial latency of every mock fetch. Zero answers during
    /// `subscribe`. Default: 50ms.
    pub fetch_latency: Duration,

    /// Quote used when a rate cannot be fetched. Default: USD at 1.0.
    pub fallback: Quote,

    /// Currency the checkout scenario switches to. Default: EUR.
    pub currency: Currency,

    /// Where the exchange-rate table lives. Default: [`RATES_ENDPOINT`].
    pub endpoint: String,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            fetch_latency: Duration::from_millis(50),
            fallback: Quote::USD,
            currency: Currency::Eur,
            endpoint: RATES_ENDPOINT.to_string(),
        }
    }
}

impl DemoConfig {
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub fn with_fetch_latency(mut self, latency: Duration) -> Self {
        self.fetch_latency = latency;
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: Quote) -> Self {
        self.fallback = fallback;
        self
    }

    #[must_use]
    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DemoConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(config.fetch_latency, Duration::from_millis(50));
        assert_eq!(config.fallback, Quote::USD);
        assert_eq!(config.endpoint, RATES_ENDPOINT);
    }

    #[test]
    fn builders_chain() {
        let config = DemoConfig::default()
            .with_debounce(Duration::ZERO)
            .with_currency(Currency::Jpy)
            .with_endpoint("mock://other");
        assert!(config.debounce.is_zero());
        assert_eq!(config.currency, Currency::Jpy);
        assert_eq!(config.endpoint, "mock://other");
    }
}
