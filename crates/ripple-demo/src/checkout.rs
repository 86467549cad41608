#![forbid(unsafe_code)]

//! Checkout screen state, derived from a currency selection.
//!
//! # Pipeline
//!
//! ```text
//! currency ─ debounce ─ remove_duplicates ─ share ─┬─ map(true) ──────────┐
//!                                                  │                      merge ─ is_updating
//!                                                  └─ fetch rate ─ quotes ┤
//!                                                                         └─ quote ─ prices
//! ```
//!
//! A new settled currency supersedes the fetch in flight: its guard is
//! dropped, which cancels it, so a slow reply for an old selection never
//! overwrites a newer one. A failed fetch falls back to the configured
//! quote.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use ripple_core::{
    AnyCancellable, CancelBag, Never, Observable, PassthroughSubject, PublisherExt, Scheduler,
};
use tracing::{debug, info};

use crate::config::DemoConfig;
use crate::currency::{Currency, CurrencyService, Quote};

/// One way of getting the order delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct ShippingOption {
    pub name: String,
    pub duration: String,
    /// Price in USD; zero means free.
    pub price: f64,
}

impl ShippingOption {
    pub fn new(name: impl Into<String>, duration: impl Into<String>, price: f64) -> Self {
        Self {
            name: name.into(),
            duration: duration.into(),
            price,
        }
    }
}

/// What is being bought. All prices are in USD.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutInfo {
    pub model: String,
    pub base_price: f64,
    pub additions_price: f64,
    pub available: bool,
    pub shipping_options: Vec<ShippingOption>,
}

impl CheckoutInfo {
    /// A custom guitar with three shipping options.
    #[must_use]
    pub fn sample() -> Self {
        Self {
            model: "Custom Stratocaster".to_string(),
            base_price: 1299.0,
            additions_price: 250.0,
            available: true,
            shipping_options: vec![
                ShippingOption::new("Standard", "5-7 business days", 0.0),
                ShippingOption::new("Express", "2-3 business days", 49.0),
                ShippingOption::new("Overnight", "next business day", 99.0),
            ],
        }
    }

    fn shipping_price(&self, index: usize) -> f64 {
        self.shipping_options
            .get(index)
            .map_or(0.0, |option| option.price)
    }

    fn total(&self, shipping: usize) -> f64 {
        self.base_price + self.additions_price + self.shipping_price(shipping)
    }

    fn shipping_label(&self, index: usize, quote: Quote) -> String {
        match self.shipping_options.get(index) {
            Some(option) if option.price == 0.0 => "Free".to_string(),
            Some(option) => quote.price(option.price),
            None => "N/A".to_string(),
        }
    }

    fn shipping_table(&self, quote: Quote) -> Vec<(String, String)> {
        (0..self.shipping_options.len())
            .map(|index| {
                (
                    self.shipping_options[index].name.clone(),
                    self.shipping_label(index, quote),
                )
            })
            .collect()
    }
}

/// Formatted prices for the checkout screen, kept in the selected currency.
pub struct CheckoutViewModel {
    info: Arc<CheckoutInfo>,
    currency: Observable<Currency>,
    selected_shipping: Observable<usize>,
    quote: Observable<Quote>,
    base_price: Observable<String>,
    additions_price: Observable<String>,
    total_price: Observable<String>,
    shipping_price: Observable<String>,
    shipping_prices: Observable<Vec<(String, String)>>,
    is_updating: Observable<bool>,
    in_flight: Arc<Mutex<Option<AnyCancellable>>>,
    bag: CancelBag,
}

impl fmt::Debug for CheckoutViewModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckoutViewModel")
            .field("model", &self.info.model)
            .field("currency", &self.currency.get())
            .field("quote", &self.quote.get())
            .field("is_updating", &self.is_updating.get())
            .field("bindings", &self.bag.len())
            .finish()
    }
}

impl CheckoutViewModel {
    /// Wire the pipeline. Prices start out in USD.
    pub fn new(
        info: CheckoutInfo,
        service: CurrencyService,
        scheduler: Arc<dyn Scheduler>,
        config: &DemoConfig,
    ) -> Self {
        let info = Arc::new(info);
        let quote = Observable::new(Quote::USD);
        let model = Self {
            currency: Observable::new(Currency::Usd),
            selected_shipping: Observable::new(0),
            base_price: Observable::new(Quote::USD.price(info.base_price)),
            additions_price: Observable::new(Quote::USD.price(info.additions_price)),
            total_price: Observable::new(Quote::USD.price(info.total(0))),
            shipping_price: Observable::new(info.shipping_label(0, Quote::USD)),
            shipping_prices: Observable::new(info.shipping_table(Quote::USD)),
            is_updating: Observable::new(false),
            in_flight: Arc::new(Mutex::new(None)),
            bag: CancelBag::new(),
            quote,
            info,
        };
        model.bind(service, scheduler, config)
    }

    fn bind(
        mut self,
        service: CurrencyService,
        scheduler: Arc<dyn Scheduler>,
        config: &DemoConfig,
    ) -> Self {
        let settled = self
            .currency
            .publisher()
            .debounce(config.debounce, scheduler)
            .remove_duplicates()
            .log_events("currency")
            .share();
        let quotes = PassthroughSubject::<Quote, Never>::new();

        // Subscribed before the fetch driver: a reply produced during the
        // settle must land after the flag goes up.
        settled
            .clone()
            .map(|_| true)
            .merge(quotes.clone().map(|_| false))
            .assign(&self.is_updating)
            .store_in(&mut self.bag);

        let in_flight = Arc::clone(&self.in_flight);
        let fallback = config.fallback;
        let replies = quotes.clone();
        settled
            .sink_values(move |currency| {
                if currency == Currency::Usd {
                    drop(take_in_flight(&in_flight));
                    replies.send(Quote::USD);
                    return;
                }
                let replies = replies.clone();
                let guard = service
                    .exchange_rate(currency)
                    .map(move |rate| Quote { currency, rate })
                    .replace_error(fallback)
                    .sink_values(move |quote| replies.send(quote));
                let superseded = in_flight
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .replace(guard);
                if superseded.is_some() {
                    debug!(%currency, "superseding rate request in flight");
                }
            })
            .store_in(&mut self.bag);

        quotes.assign(&self.quote).store_in(&mut self.bag);
        self.bind_prices();
        self
    }

    fn bind_prices(&mut self) {
        let quotes = self.quote.publisher();

        let base = self.info.base_price;
        quotes
            .clone()
            .map(move |quote| quote.price(base))
            .assign(&self.base_price)
            .store_in(&mut self.bag);

        let additions = self.info.additions_price;
        quotes
            .clone()
            .map(move |quote| quote.price(additions))
            .assign(&self.additions_price)
            .store_in(&mut self.bag);

        let info = Arc::clone(&self.info);
        quotes
            .clone()
            .map(move |quote| info.shipping_table(quote))
            .assign(&self.shipping_prices)
            .store_in(&mut self.bag);

        // Totals depend on both the quote and the shipping selection.
        let (info, selected) = (Arc::clone(&self.info), self.selected_shipping.clone());
        quotes
            .clone()
            .map(move |quote| quote.price(info.total(selected.get())))
            .assign(&self.total_price)
            .store_in(&mut self.bag);
        let (info, quote) = (Arc::clone(&self.info), self.quote.clone());
        self.selected_shipping
            .publisher()
            .map(move |index| quote.get().price(info.total(index)))
            .assign(&self.total_price)
            .store_in(&mut self.bag);

        let (info, selected) = (Arc::clone(&self.info), self.selected_shipping.clone());
        quotes
            .map(move |quote| info.shipping_label(selected.get(), quote))
            .assign(&self.shipping_price)
            .store_in(&mut self.bag);
        let (info, quote) = (Arc::clone(&self.info), self.quote.clone());
        self.selected_shipping
            .publisher()
            .map(move |index| info.shipping_label(index, quote.get()))
            .assign(&self.shipping_price)
            .store_in(&mut self.bag);
    }

    /// Change the display currency. Takes effect after the debounce
    /// interval.
    pub fn select_currency(&self, currency: Currency) {
        info!(%currency, "currency selected");
        self.currency.set(currency);
    }

    /// Pick a shipping option by position. Out-of-range indices price as
    /// "N/A".
    pub fn select_shipping(&self, index: usize) {
        self.selected_shipping.set(index);
    }

    #[must_use]
    pub fn info(&self) -> &CheckoutInfo {
        &self.info
    }

    /// The currency input binding.
    #[must_use]
    pub fn currency(&self) -> &Observable<Currency> {
        &self.currency
    }

    /// The quote prices are currently shown in.
    #[must_use]
    pub fn quote(&self) -> &Observable<Quote> {
        &self.quote
    }

    #[must_use]
    pub fn base_price(&self) -> &Observable<String> {
        &self.base_price
    }

    #[must_use]
    pub fn additions_price(&self) -> &Observable<String> {
        &self.additions_price
    }

    #[must_use]
    pub fn total_price(&self) -> &Observable<String> {
        &self.total_price
    }

    /// Price of the selected shipping option, or "Free".
    #[must_use]
    pub fn shipping_price(&self) -> &Observable<String> {
        &self.shipping_price
    }

    /// Every shipping option with its formatted price, in listing order.
    #[must_use]
    pub fn shipping_prices(&self) -> &Observable<Vec<(String, String)>> {
        &self.shipping_prices
    }

    /// True from a settled currency change until its rate arrives.
    #[must_use]
    pub fn is_updating(&self) -> &Observable<bool> {
        &self.is_updating
    }

    #[must_use]
    pub fn checkout_button(&self) -> &'static str {
        if self.info.available {
            "Order now"
        } else {
            "Model unavailable"
        }
    }
}

impl Drop for CheckoutViewModel {
    fn drop(&mut self) {
        drop(take_in_flight(&self.in_flight));
        self.bag.cancel_all();
    }
}

fn take_in_flight(slot: &Mutex<Option<AnyCancellable>>) -> Option<AnyCancellable> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::fetch::{Fetcher, MockFetcher, Request};
    use ripple_core::{AnyPublisher, Deferred, ManualScheduler, Promise};
    use web_time::Duration;

    const RATES: &str = r#"{"base": "USD", "rates": {"EUR": 0.5, "GBP": 0.25, "JPY": 100.0}}"#;
    const ENDPOINT: &str = "mock://rates";

    fn config() -> DemoConfig {
        DemoConfig::default()
            .with_debounce(Duration::from_millis(500))
            .with_endpoint(ENDPOINT)
    }

    fn model_with(fetcher: Arc<dyn Fetcher>) -> (CheckoutViewModel, ManualScheduler) {
        let scheduler = ManualScheduler::new();
        let model = CheckoutViewModel::new(
            CheckoutInfo::sample(),
            CurrencyService::new(fetcher, ENDPOINT),
            Arc::new(scheduler.clone()),
            &config(),
        );
        (model, scheduler)
    }

    /// Holds every request's promise until the test resolves it.
    #[derive(Default)]
    struct HeldFetcher {
        pending: Arc<Mutex<Vec<Promise<Vec<u8>, FetchError>>>>,
    }

    impl HeldFetcher {
        fn resolve_next(&self, body: &str) -> bool {
            let promise = self.pending.lock().unwrap().remove(0);
            let cancelled = promise.is_cancelled();
            promise.succeed(body.as_bytes().to_vec());
            !cancelled
        }
    }

    impl Fetcher for HeldFetcher {
        fn fetch(&self, _request: &Request) -> AnyPublisher<Vec<u8>, FetchError> {
            let pending = Arc::clone(&self.pending);
            Deferred::new(move |promise: Promise<Vec<u8>, FetchError>| {
                pending.lock().unwrap().push(promise);
            })
            .boxed()
        }
    }

    #[test]
    fn starts_in_usd() {
        let (model, _) = model_with(Arc::new(MockFetcher::new()));
        assert_eq!(model.base_price().get(), "$1299.00");
        assert_eq!(model.additions_price().get(), "$250.00");
        assert_eq!(model.total_price().get(), "$1549.00");
        assert_eq!(model.shipping_price().get(), "Free");
        assert!(!model.is_updating().get());
        assert_eq!(model.checkout_button(), "Order now");
    }

    #[test]
    fn settled_currency_reprices_everything() {
        let fetcher = MockFetcher::new().with_body(ENDPOINT, RATES);
        let (model, scheduler) = model_with(Arc::new(fetcher.clone()));
        model.select_currency(Currency::Eur);
        scheduler.advance(Duration::from_millis(499));
        assert_eq!(model.base_price().get(), "$1299.00");

        scheduler.advance(Duration::from_millis(1));
        assert_eq!(model.quote().get(), Quote { currency: Currency::Eur, rate: 0.5 });
        assert_eq!(model.base_price().get(), "€649.50");
        assert_eq!(model.total_price().get(), "€774.50");
        assert_eq!(
            model.shipping_prices().get(),
            vec![
                ("Standard".to_string(), "Free".to_string()),
                ("Express".to_string(), "€24.50".to_string()),
                ("Overnight".to_string(), "€49.50".to_string()),
            ]
        );
        assert!(!model.is_updating().get());
        assert_eq!(fetcher.request_count(), 1);
    }

    #[test]
    fn typing_burst_fetches_once() {
        let fetcher = MockFetcher::new().with_body(ENDPOINT, RATES);
        let (model, scheduler) = model_with(Arc::new(fetcher.clone()));
        for currency in [Currency::Eur, Currency::Gbp, Currency::Jpy] {
            model.select_currency(currency);
            scheduler.advance(Duration::from_millis(100));
        }
        scheduler.advance(Duration::from_millis(500));
        assert_eq!(model.base_price().get(), "¥129900");
        assert_eq!(fetcher.request_count(), 1);
    }

    #[test]
    fn reselecting_the_same_currency_does_not_refetch() {
        let fetcher = MockFetcher::new().with_body(ENDPOINT, RATES);
        let (model, scheduler) = model_with(Arc::new(fetcher.clone()));
        model.select_currency(Currency::Gbp);
        scheduler.advance(Duration::from_millis(600));
        model.select_currency(Currency::Eur);
        model.select_currency(Currency::Gbp);
        scheduler.advance(Duration::from_millis(600));
        assert_eq!(fetcher.request_count(), 1);
        assert_eq!(model.base_price().get(), "£324.75");
    }

    #[test]
    fn failed_fetch_falls_back_to_usd() {
        let fetcher = MockFetcher::new().with_status(ENDPOINT, 503);
        let (model, scheduler) = model_with(Arc::new(fetcher));
        model.select_currency(Currency::Eur);
        scheduler.advance(Duration::from_millis(500));
        assert_eq!(model.quote().get(), Quote::USD);
        assert_eq!(model.base_price().get(), "$1299.00");
        assert!(!model.is_updating().get());
    }

    #[test]
    fn updating_flag_spans_the_fetch() {
        let fetcher = Arc::new(HeldFetcher::default());
        let (model, scheduler) = model_with(Arc::clone(&fetcher) as Arc<dyn Fetcher>);
        model.select_currency(Currency::Eur);
        scheduler.advance(Duration::from_millis(500));
        assert!(model.is_updating().get());
        assert_eq!(model.base_price().get(), "$1299.00");

        assert!(fetcher.resolve_next(RATES));
        assert!(!model.is_updating().get());
        assert_eq!(model.base_price().get(), "€649.50");
    }

    #[test]
    fn newer_selection_cancels_slow_reply() {
        let fetcher = Arc::new(HeldFetcher::default());
        let (model, scheduler) = model_with(Arc::clone(&fetcher) as Arc<dyn Fetcher>);
        model.select_currency(Currency::Eur);
        scheduler.advance(Duration::from_millis(500));
        model.select_currency(Currency::Gbp);
        scheduler.advance(Duration::from_millis(500));

        assert!(!fetcher.resolve_next(RATES), "EUR request should be cancelled");
        assert_eq!(model.base_price().get(), "$1299.00");
        assert!(fetcher.resolve_next(RATES));
        assert_eq!(model.base_price().get(), "£324.75");
    }

    #[test]
    fn shipping_selection_reprices_total() {
        let fetcher = MockFetcher::new().with_body(ENDPOINT, RATES);
        let (model, scheduler) = model_with(Arc::new(fetcher));
        model.select_shipping(1);
        assert_eq!(model.total_price().get(), "$1598.00");
        assert_eq!(model.shipping_price().get(), "$49.00");

        model.select_currency(Currency::Eur);
        scheduler.advance(Duration::from_millis(500));
        assert_eq!(model.total_price().get(), "€799.00");
        assert_eq!(model.shipping_price().get(), "€24.50");

        model.select_shipping(7);
        assert_eq!(model.shipping_price().get(), "N/A");
    }

    #[test]
    fn dropping_the_model_stops_fetching() {
        let fetcher = MockFetcher::new().with_body(ENDPOINT, RATES);
        let (model, scheduler) = model_with(Arc::new(fetcher.clone()));
        model.select_currency(Currency::Eur);
        drop(model);
        scheduler.advance(Duration::from_millis(500));
        assert_eq!(fetcher.request_count(), 0);
    }
}
