use std::sync::Arc;

use faro_core::BeaconClient;
use faro_middleware::{CachingClient, RoundCache};
use faro_mock::MockClient;

#[tokio::test]
async fn oldest_inserted_round_is_evicted_first() {
    let mock = MockClient::builder().latest(10).build();
    let client = CachingClient::new(Arc::new(mock.clone()), Arc::new(RoundCache::new(2)));

    let _ = client.fetch(1).await.unwrap();
    let _ = client.fetch(2).await.unwrap();
    let _ = client.fetch(3).await.unwrap(); // evicts round 1
    assert_eq!(mock.fetch_count(), 3);

    let _ = client.fetch(2).await.unwrap();
    let _ = client.fetch(3).await.unwrap();
    assert_eq!(mock.fetch_count(), 3, "rounds 2 and 3 must still be cached");

    let _ = client.fetch(1).await.unwrap();
    assert_eq!(mock.fetch_count(), 4, "round 1 was the oldest insert");
}

#[tokio::test]
async fn lookups_do_not_refresh_eviction_order() {
    let mock = MockClient::builder().latest(10).build();
    let client = CachingClient::new(Arc::new(mock.clone()), Arc::new(RoundCache::new(2)));

    let _ = client.fetch(1).await.unwrap();
    let _ = client.fetch(2).await.unwrap();

    // Reading round 1 must not save it from eviction; order is insertion,
    // not recency of use.
    let _ = client.fetch(1).await.unwrap();
    let _ = client.fetch(3).await.unwrap(); // still evicts round 1

    let _ = client.fetch(1).await.unwrap();
    assert_eq!(mock.fetch_count(), 4);
}

#[tokio::test]
async fn cache_len_is_bounded_by_capacity() {
    let mock = MockClient::builder().latest(100).build();
    let cache = Arc::new(RoundCache::new(3));
    let client = CachingClient::new(Arc::new(mock), Arc::clone(&cache));

    for round in 1..=20u64 {
        let _ = client.fetch(round).await.unwrap();
    }
    assert_eq!(cache.len(), 3);
    assert!(cache.get(20).is_some());
    assert!(cache.get(1).is_none());
}
