use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures::future;
use sentry::{Hub, SentryFutureExt};
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::error::{PriceError, ServiceError};
use crate::service::PriceService;
use crate::store::{Entry, EntryStore};

/// The outcome of looking up a single item as part of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceLookup {
    /// The requested item.
    pub item_code: String,
    /// The price, or the reason why there is none.
    pub result: Result<f64, PriceError>,
}

/// A cache that transparently wraps a [`PriceService`].
///
/// The cache remembers the prices it was asked for, so that repeated lookups don't have to wait
/// on the service every time. A price is only ever returned if it is younger than the configured
/// [`max_age`](CacheConfig::max_age), otherwise it is fetched again.
///
/// Cloning the cache is cheap, and all clones share the same stored prices.
pub struct TransparentCache {
    service: Arc<dyn PriceService>,
    config: CacheConfig,
    store: Arc<EntryStore>,
}

impl std::fmt::Debug for TransparentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransparentCache")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish()
    }
}

impl Clone for TransparentCache {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            config: self.config,
            store: Arc::clone(&self.store),
        }
    }
}

impl TransparentCache {
    pub fn new<S: PriceService>(service: S, config: CacheConfig) -> Self {
        Self {
            service: Arc::new(service),
            config,
            store: Default::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the stored entry for `item_code` without checking its freshness.
    ///
    /// The entry might be stale already. Use [`get_price`](Self::get_price) to get a price that
    /// is safe to use.
    pub fn cached_entry(&self, item_code: &str) -> Option<Entry> {
        self.store.lookup(item_code)
    }

    /// Gets the price for the item, either from the cache or from the service if it was not
    /// cached or is too old.
    ///
    /// # Errors
    ///
    /// Fails with [`PriceError::Upstream`] if the price had to be fetched and the service failed.
    /// A failure is not cached, the next lookup asks the service again.
    pub async fn get_price(&self, item_code: &str) -> Result<f64, PriceError> {
        metric!(counter("prices.access") += 1);

        if let Some(entry) = self.store.lookup(item_code) {
            if entry.is_fresh(self.config.max_age) {
                metric!(counter("prices.memory.hit") += 1);
                tracing::trace!(item_code, age = ?entry.age(), "Serving cached price");
                return Ok(entry.price);
            }

            metric!(counter("prices.memory.stale") += 1);
            tracing::trace!(item_code, age = ?entry.age(), "Cached price is stale");
        }

        let price = self
            .fetch(item_code)
            .await
            .map_err(|source| PriceError::Upstream {
                item_code: item_code.to_owned(),
                source,
            })?;

        let entry = self.store.put(item_code, price, Instant::now());
        self.spawn_expiry(item_code, entry);

        Ok(price)
    }

    /// Gets the prices for several items at once.
    ///
    /// Every item is looked up concurrently in its own task, some might be found in the cache,
    /// others might not. Prices are returned in the order their lookups completed, which is not
    /// necessarily the order of `item_codes`.
    ///
    /// Items whose lookup fails are logged and left out of the result, so the result can be
    /// shorter than `item_codes`. This never returns an error, use
    /// [`try_get_prices`](Self::try_get_prices) or
    /// [`get_prices_detailed`](Self::get_prices_detailed) to learn about failures.
    pub async fn get_prices<I, S>(&self, item_codes: I) -> Result<Vec<f64>, PriceError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prices = Arc::new(Mutex::new(Vec::new()));

        let tasks: Vec<_> = item_codes
            .into_iter()
            .map(|item_code| {
                let item_code: String = item_code.into();
                let this = self.clone();
                let prices = Arc::clone(&prices);
                let task = async move {
                    match this.get_price(&item_code).await {
                        Ok(price) => prices
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(price),
                        Err(error) => {
                            metric!(
                                counter("prices.batch.failed") += 1,
                                "reason" => error.metrics_tag(),
                            );
                            tracing::debug!(
                                error = &error as &dyn std::error::Error,
                                "Dropping failed price lookup from batch",
                            );
                        }
                    }
                };
                tokio::spawn(task.bind_hub(Hub::new_from_top(Hub::current())))
            })
            .collect();

        metric!(histogram("prices.batch.size") = tasks.len() as u64);

        for result in future::join_all(tasks).await {
            if let Err(error) = result {
                tracing::error!(
                    error = &error as &dyn std::error::Error,
                    "Price lookup task did not complete",
                );
            }
        }

        let prices = std::mem::take(&mut *prices.lock().unwrap_or_else(PoisonError::into_inner));
        Ok(prices)
    }

    /// Gets the prices for several items at once, reporting the outcome of every single lookup.
    ///
    /// Items are looked up concurrently just like in [`get_prices`](Self::get_prices), but the
    /// returned lookups correspond one to one to `item_codes`, in the same order.
    pub async fn get_prices_detailed<I, S>(&self, item_codes: I) -> Vec<PriceLookup>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (item_codes, tasks): (Vec<String>, Vec<_>) = item_codes
            .into_iter()
            .map(|item_code| {
                let item_code: String = item_code.into();
                let this = self.clone();
                let task = {
                    let item_code = item_code.clone();
                    async move { this.get_price(&item_code).await }
                };
                let handle = tokio::spawn(task.bind_hub(Hub::new_from_top(Hub::current())));
                (item_code, handle)
            })
            .unzip();

        metric!(histogram("prices.batch.size") = tasks.len() as u64);

        let results = future::join_all(tasks).await;
        item_codes
            .into_iter()
            .zip(results)
            .map(|(item_code, result)| {
                let result = match result {
                    Ok(result) => result,
                    Err(error) => {
                        tracing::error!(
                            error = &error as &dyn std::error::Error,
                            item_code = %item_code,
                            "Price lookup task did not complete",
                        );
                        Err(PriceError::Internal {
                            item_code: item_code.clone(),
                        })
                    }
                };
                if let Err(error) = &result {
                    metric!(
                        counter("prices.batch.failed") += 1,
                        "reason" => error.metrics_tag(),
                    );
                }
                PriceLookup { item_code, result }
            })
            .collect()
    }

    /// Gets the prices for several items at once, failing if any of the lookups fails.
    ///
    /// On success, the prices are in the same order as `item_codes`. On failure, the error of
    /// the first failing item (in the order of `item_codes`) is returned. All lookups run to
    /// completion either way, so successful ones are cached.
    pub async fn try_get_prices<I, S>(&self, item_codes: I) -> Result<Vec<f64>, PriceError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.get_prices_detailed(item_codes)
            .await
            .into_iter()
            .map(|lookup| lookup.result)
            .collect()
    }

    /// Asks the service for a price, bounded by the configured `fetch_timeout`.
    async fn fetch(&self, item_code: &str) -> Result<f64, ServiceError> {
        tracing::trace!(item_code, "Fetching price from service");
        let start = Instant::now();

        let result = match self.config.fetch_timeout {
            Some(timeout) => {
                match tokio::time::timeout(timeout, self.service.get_price_for(item_code)).await {
                    Ok(result) => result,
                    Err(_) => Err(ServiceError::Timeout(timeout)),
                }
            }
            None => self.service.get_price_for(item_code).await,
        };

        let status = match &result {
            Ok(_) => "ok",
            Err(ServiceError::NotFound) => "notfound",
            Err(ServiceError::Timeout(_)) => "timeout",
            Err(ServiceError::Unavailable(_)) => "unavailable",
        };
        metric!(counter("prices.fetch") += 1, "status" => status);
        metric!(timer("prices.fetch.duration") = start.elapsed(), "status" => status);

        result
    }

    /// Spawns a task removing `entry` once it went stale.
    ///
    /// The task does nothing if `item_code` was written again in the meantime, or if the cache
    /// was dropped. No task is spawned if the entry can never go stale.
    fn spawn_expiry(&self, item_code: &str, entry: Entry) {
        let Some(deadline) = entry.fetched_at.checked_add(self.config.max_age) else {
            tracing::trace!(item_code, "Price never expires, not scheduling expiry");
            return;
        };
        let store: Weak<EntryStore> = Arc::downgrade(&self.store);
        let item_code = item_code.to_owned();

        let task = async move {
            tokio::time::sleep_until(deadline).await;

            let Some(store) = store.upgrade() else {
                return;
            };
            if store.remove_entry(&item_code, &entry) {
                metric!(counter("prices.expired") += 1);
                tracing::trace!(item_code = %item_code, "Removed expired price");
            }
        };
        tokio::spawn(task.bind_hub(Hub::new_from_top(Hub::current())));
    }
}
