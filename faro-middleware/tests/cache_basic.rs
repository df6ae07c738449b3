use std::sync::Arc;

use faro_core::BeaconClient;
use faro_middleware::{CachingClient, RoundCache};
use faro_mock::MockClient;

#[tokio::test]
async fn second_fetch_for_same_round_hits_cache() {
    let mock = MockClient::builder().latest(10).build();
    let client = CachingClient::new(Arc::new(mock.clone()), Arc::new(RoundCache::new(32)));

    let first = client.fetch(7).await.unwrap();
    let second = client.fetch(7).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(mock.fetch_count(), 1, "second call should be served locally");
}

#[tokio::test]
async fn distinct_rounds_are_distinct_entries() {
    let mock = MockClient::builder().latest(10).build();
    let client = CachingClient::new(Arc::new(mock.clone()), Arc::new(RoundCache::new(32)));

    let a = client.fetch(3).await.unwrap();
    let b = client.fetch(4).await.unwrap();
    assert_ne!(a.randomness, b.randomness);
    assert_eq!(mock.fetch_count(), 2);

    let _ = client.fetch(3).await.unwrap();
    let _ = client.fetch(4).await.unwrap();
    assert_eq!(mock.fetch_count(), 2);
}

#[tokio::test]
async fn failures_are_never_cached() {
    let mock = MockClient::builder().latest(10).fails().build();
    let client = CachingClient::new(Arc::new(mock.clone()), Arc::new(RoundCache::new(32)));

    assert!(client.fetch(5).await.is_err());
    assert_eq!(mock.fetch_count(), 1);

    mock.set_fail(false);
    let beacon = client.fetch(5).await.unwrap();
    assert_eq!(beacon.round, 5);
    assert_eq!(mock.fetch_count(), 2, "the failure must not satisfy a retry");
}

#[tokio::test]
async fn capacity_zero_stores_nothing_but_still_delegates() {
    let mock = MockClient::builder().latest(10).build();
    let cache = Arc::new(RoundCache::new(0));
    let client = CachingClient::new(Arc::new(mock.clone()), Arc::clone(&cache));

    let _ = client.fetch(2).await.unwrap();
    let _ = client.fetch(2).await.unwrap();
    assert_eq!(mock.fetch_count(), 2);
    assert!(cache.is_empty());
}
