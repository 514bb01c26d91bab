use std::time::Duration;

use pricecache::config::Config;
use pricecache::{PriceError, ServiceError};
use pricecache_test::timed;

use crate::{LATENCY, setup_cache};

#[tokio::test(start_paused = true)]
async fn test_cached_price_until_max_age() {
    let (cache, service) = setup_cache(Duration::from_secs(1));

    let (price, elapsed) = timed(cache.get_price("A")).await;
    assert_eq!(price, Ok(10.0));
    assert!(elapsed >= LATENCY);

    // a cache hit does not wait on the service
    let (price, elapsed) = timed(cache.get_price("A")).await;
    assert_eq!(price, Ok(10.0));
    assert_eq!(elapsed, Duration::ZERO);
    assert_eq!(service.calls_for("A"), 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let (price, elapsed) = timed(cache.get_price("A")).await;
    assert_eq!(price, Ok(10.0));
    assert!(elapsed >= LATENCY);
    assert_eq!(service.calls_for("A"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reads_within_max_age_never_refetch() {
    let (cache, service) = setup_cache(Duration::from_secs(1));

    cache.get_price("C").await.unwrap();
    for _ in 0..9 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.get_price("C").await, Ok(30.0));
    }
    assert_eq!(service.calls_for("C"), 1);

    // 1s after the fetch, exactly one new fetch happens
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cache.get_price("C").await, Ok(30.0));
    assert_eq!(cache.get_price("C").await, Ok(30.0));
    assert_eq!(service.calls_for("C"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_updated_price_after_expiry() {
    let (cache, service) = setup_cache(Duration::from_secs(1));

    assert_eq!(cache.get_price("A").await, Ok(10.0));
    service.set_price("A", 12.0);
    assert_eq!(cache.get_price("A").await, Ok(10.0));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(cache.get_price("A").await, Ok(12.0));
}

#[tokio::test(start_paused = true)]
async fn test_failure_names_item() {
    let (cache, _service) = setup_cache(Duration::from_secs(1));

    let err = cache.get_price("B").await.unwrap_err();
    assert_eq!(
        err,
        PriceError::Upstream {
            item_code: "B".into(),
            source: ServiceError::NotFound,
        }
    );
    let message = err.to_string();
    assert!(message.contains("B"), "{message}");
    assert!(message.contains("not found"), "{message}");
}

#[tokio::test(start_paused = true)]
async fn test_clones_share_entries() {
    let (cache, service) = setup_cache(Duration::from_secs(1));
    let other = cache.clone();

    cache.get_price("A").await.unwrap();
    other.get_price("A").await.unwrap();
    assert_eq!(service.calls_for("A"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_configured_max_age_beyond_clock_range() {
    let config = Config::from_reader("cache:\n  max_age: 500000000000years\n".as_bytes()).unwrap();
    let (cache, service) = setup_cache(config.cache.max_age);

    assert_eq!(cache.get_price("A").await, Ok(10.0));
    tokio::time::sleep(Duration::from_secs(86400)).await;
    assert_eq!(cache.get_price("A").await, Ok(10.0));
    assert_eq!(service.calls_for("A"), 1);
}
