//! The expensive price lookup service the cache sits in front of.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::ServiceError;

/// A service that we can use to get prices for items.
///
/// Calls to this service are expensive, they take time. Implementations need to be safe to call
/// concurrently, for the same as well as for different items, and give no ordering guarantees
/// between calls.
pub trait PriceService: Send + Sync + 'static {
    /// Fetches the current price for `item_code`.
    fn get_price_for<'a>(&'a self, item_code: &'a str) -> BoxFuture<'a, Result<f64, ServiceError>>;
}

impl<T: PriceService + ?Sized> PriceService for Arc<T> {
    fn get_price_for<'a>(&'a self, item_code: &'a str) -> BoxFuture<'a, Result<f64, ServiceError>> {
        (**self).get_price_for(item_code)
    }
}

/// A [`PriceService`] answering from a fixed price table after a simulated latency.
///
/// Items without a price fail with [`ServiceError::NotFound`], unless a different failure was
/// registered with [`with_failure`](Self::with_failure). The service keeps track of how often it
/// was called.
#[derive(Debug, Default)]
pub struct StaticPriceService {
    latency: Duration,
    prices: RwLock<HashMap<String, Result<f64, ServiceError>>>,
    calls: Mutex<HashMap<String, usize>>,
    total_calls: AtomicUsize,
}

impl StaticPriceService {
    /// Creates an empty service that answers after `latency`.
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    /// Creates a service that answers from the given price table after `latency`.
    pub fn from_prices<I, S>(latency: Duration, prices: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let service = Self::new(latency);
        for (item_code, price) in prices {
            service.set_price(item_code, price);
        }
        service
    }

    /// Adds a price to the table.
    pub fn with_price(self, item_code: impl Into<String>, price: f64) -> Self {
        self.set_price(item_code, price);
        self
    }

    /// Makes lookups of `item_code` fail with `error`.
    pub fn with_failure(self, item_code: impl Into<String>, error: ServiceError) -> Self {
        self.set_failure(item_code, error);
        self
    }

    /// Changes the price the service answers with for `item_code`.
    pub fn set_price(&self, item_code: impl Into<String>, price: f64) {
        self.prices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item_code.into(), Ok(price));
    }

    /// Makes further lookups of `item_code` fail with `error`.
    pub fn set_failure(&self, item_code: impl Into<String>, error: ServiceError) {
        self.prices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item_code.into(), Err(error));
    }

    /// The total number of lookups this service has answered or is answering.
    pub fn calls(&self) -> usize {
        self.total_calls.load(Ordering::Relaxed)
    }

    /// The number of lookups of `item_code`.
    pub fn calls_for(&self, item_code: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(item_code)
            .copied()
            .unwrap_or_default()
    }

    fn lookup(&self, item_code: &str) -> Result<f64, ServiceError> {
        self.prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(item_code)
            .cloned()
            .unwrap_or(Err(ServiceError::NotFound))
    }
}

impl PriceService for StaticPriceService {
    fn get_price_for<'a>(&'a self, item_code: &'a str) -> BoxFuture<'a, Result<f64, ServiceError>> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(item_code.to_owned())
            .or_default() += 1;

        Box::pin(async move {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.lookup(item_code)
        })
    }
}
