use std::sync::Arc;
use std::time::Duration;

use pricecache::{CacheConfig, StaticPriceService, TransparentCache};

/// The latency of the price service used in these tests.
pub const LATENCY: Duration = Duration::from_millis(50);

/// Creates a cache in front of a service that knows the prices of `A` and `C`.
///
/// Everything else fails with "not found".
pub fn setup_cache(max_age: Duration) -> (TransparentCache, Arc<StaticPriceService>) {
    pricecache_test::setup();

    let service = Arc::new(
        StaticPriceService::new(LATENCY)
            .with_price("A", 10.0)
            .with_price("C", 30.0),
    );
    let cache = TransparentCache::new(service.clone(), CacheConfig::with_max_age(max_age));
    (cache, service)
}

pub fn sorted(mut prices: Vec<f64>) -> Vec<f64> {
    prices.sort_by(f64::total_cmp);
    prices
}
