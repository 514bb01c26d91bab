use std::time::Duration;

use pricecache::PriceError;
use pricecache_test::timed;

use crate::{LATENCY, setup_cache, sorted};

#[tokio::test(start_paused = true)]
async fn test_all_success() {
    let (cache, service) = setup_cache(Duration::from_secs(1));

    let (prices, elapsed) = timed(cache.get_prices(["A", "C"])).await;
    assert_eq!(sorted(prices.unwrap()), vec![10.0, 30.0]);
    // lookups run concurrently
    assert_eq!(elapsed, LATENCY);
    assert_eq!(service.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_partial_failure_is_swallowed() {
    let (cache, _service) = setup_cache(Duration::from_secs(1));

    let prices = cache.get_prices(["A", "B"]).await.unwrap();
    assert_eq!(prices, vec![10.0]);

    // three out of five fail
    let prices = cache.get_prices(["X", "A", "Y", "C", "Z"]).await.unwrap();
    assert_eq!(sorted(prices), vec![10.0, 30.0]);

    // but looking up a failing item on its own reports the failure
    let err = cache.get_price("B").await.unwrap_err();
    assert_eq!(err.item_code(), "B");
}

#[tokio::test(start_paused = true)]
async fn test_batch_fills_cache() {
    let (cache, service) = setup_cache(Duration::from_secs(1));

    cache.get_prices(["A", "C"]).await.unwrap();

    let (price, elapsed) = timed(cache.get_price("C")).await;
    assert_eq!(price, Ok(30.0));
    assert_eq!(elapsed, Duration::ZERO);
    assert_eq!(service.calls_for("C"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_batch_refetches_stale_entries() {
    let (cache, service) = setup_cache(Duration::from_secs(1));

    cache.get_price("A").await.unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    cache.get_price("C").await.unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;

    // `A` is stale by now, `C` is not
    let prices = cache.get_prices(["A", "C"]).await.unwrap();
    assert_eq!(sorted(prices), vec![10.0, 30.0]);
    assert_eq!(service.calls_for("A"), 2);
    assert_eq!(service.calls_for("C"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_detailed_and_strict_batches() {
    let (cache, _service) = setup_cache(Duration::from_secs(1));

    let lookups = cache.get_prices_detailed(["B", "A"]).await;
    let item_codes: Vec<_> = lookups.iter().map(|l| l.item_code.as_str()).collect();
    assert_eq!(item_codes, ["B", "A"]);
    assert!(matches!(lookups[0].result, Err(PriceError::Upstream { .. })));
    assert_eq!(lookups[1].result, Ok(10.0));

    assert_eq!(cache.try_get_prices(["C", "A"]).await, Ok(vec![30.0, 10.0]));
    let err = cache.try_get_prices(["C", "B"]).await.unwrap_err();
    assert_eq!(err.item_code(), "B");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_batches() {
    let (cache, _service) = setup_cache(Duration::from_secs(60));

    let batches = (0..16).map(|_| {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get_prices(["A", "B", "C"]).await })
    });
    for batch in futures::future::join_all(batches).await {
        assert_eq!(sorted(batch.unwrap().unwrap()), vec![10.0, 30.0]);
    }
}
