#![forbid(unsafe_code)]

//! Currencies, price formatting, and the exchange-rate service.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ripple_core::{AnyPublisher, PublisherExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DecodeError, ServiceError};
use crate::fetch::{Fetcher, Request, decode};

/// Currencies a price can be shown in. Rates are quoted against `Usd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Jpy,
}

impl Currency {
    pub const ALL: [Self; 4] = [Self::Usd, Self::Eur, Self::Gbp, Self::Jpy];

    /// ISO 4217 code, as used in rate tables.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Jpy => "JPY",
        }
    }

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Usd => "$",
            Self::Eur => "€",
            Self::Gbp => "£",
            Self::Jpy => "¥",
        }
    }

    /// Render `amount` with this currency's symbol and minor units.
    #[must_use]
    pub fn format(self, amount: f64) -> String {
        match self {
            Self::Jpy => format!("{}{:.0}", self.symbol(), amount),
            _ => format!("{}{:.2}", self.symbol(), amount),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error from [`Currency::from_str`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCurrency(pub String);

impl fmt::Display for UnknownCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown currency '{}'", self.0)
    }
}

impl std::error::Error for UnknownCurrency {}

impl FromStr for Currency {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|currency| currency.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownCurrency(s.to_string()))
    }
}

/// A currency together with its rate against USD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub currency: Currency,
    pub rate: f64,
}

impl Quote {
    /// The identity quote, used when no rate is available.
    pub const USD: Self = Self {
        currency: Currency::Usd,
        rate: 1.0,
    };

    /// Convert a USD amount and format it.
    #[must_use]
    pub fn price(self, usd: f64) -> String {
        self.currency.format(usd * self.rate)
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    rates: HashMap<String, f64>,
    #[allow(dead_code)]
    base: String,
}

/// Looks up exchange rates through a [`Fetcher`].
#[derive(Clone)]
pub struct CurrencyService {
    fetcher: Arc<dyn Fetcher>,
    endpoint: String,
}

impl fmt::Debug for CurrencyService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrencyService")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl CurrencyService {
    pub fn new(fetcher: Arc<dyn Fetcher>, endpoint: impl Into<String>) -> Self {
        Self {
            fetcher,
            endpoint: endpoint.into(),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The rate of `currency` against USD: one value, then completion.
    ///
    /// Each subscription fetches the rate table again.
    #[must_use]
    pub fn exchange_rate(&self, currency: Currency) -> AnyPublisher<f64, ServiceError> {
        debug!(currency = currency.code(), endpoint = %self.endpoint, "exchange rate requested");
        self.fetcher
            .fetch(&Request::get(self.endpoint.clone()))
            .try_map(move |body| {
                let response: ExchangeResponse = decode(&body)?;
                let rate = response
                    .rates
                    .get(currency.code())
                    .copied()
                    .ok_or(DecodeError::MissingRate {
                        code: currency.code(),
                    })?;
                Ok::<f64, ServiceError>(rate)
            })
            .boxed()
    }
}
