use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use faro_core::BeaconClient;
use faro_middleware::FailoverWatcher;
use faro_mock::{MockClient, test_beacon, test_info};

const PERIOD: u64 = 30;

/// Identity whose clock currently sits in the middle of round 13.
fn mid_round_13() -> faro_core::BeaconInfo {
    let genesis = Utc::now().timestamp() - (12 * PERIOD + PERIOD / 2) as i64;
    test_info(genesis, PERIOD)
}

#[tokio::test(start_paused = true)]
async fn stalled_push_is_substituted_by_explicit_fetch() {
    let info = mid_round_13();
    let mock = MockClient::builder().info(info.clone()).latest(13).build();
    let failover = FailoverWatcher::new(
        Arc::new(mock.clone()),
        info,
        Duration::from_secs(2 * PERIOD), // grace of two rounds
    );

    let (handle, mut rx) = failover.watch().await.unwrap();

    // Push delivers round 10, then goes silent.
    mock.push().emit(&test_beacon(10));
    assert_eq!(rx.recv().await.unwrap().round, 10);

    // Once the grace period elapses, the watcher fills the gap itself.
    let substituted = rx.recv().await.unwrap();
    assert!(substituted.round >= 11, "got round {}", substituted.round);
    assert!(mock.fetch_count() >= 1);

    // The stall never closed the stream: a late push still flows.
    mock.push().emit(&test_beacon(14));
    assert_eq!(rx.recv().await.unwrap().round, 14);

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn push_deliveries_pass_through_in_order_without_substitution() {
    let info = mid_round_13();
    let mock = MockClient::builder().info(info.clone()).latest(13).build();
    let failover = FailoverWatcher::new(
        Arc::new(mock.clone()),
        info,
        Duration::from_secs(2 * PERIOD),
    );

    let (handle, mut rx) = failover.watch().await.unwrap();
    for round in [11u64, 12, 13] {
        mock.push().emit(&test_beacon(round));
    }
    for round in [11u64, 12, 13] {
        assert_eq!(rx.recv().await.unwrap().round, round);
    }
    // Delivery is current, so liveness checks find nothing to substitute.
    assert_eq!(mock.fetch_count(), 0);
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stale_and_duplicate_rounds_are_not_redelivered() {
    let info = mid_round_13();
    let mock = MockClient::builder().info(info.clone()).latest(13).build();
    let failover = FailoverWatcher::new(
        Arc::new(mock.clone()),
        info,
        Duration::from_secs(2 * PERIOD),
    );

    let (handle, mut rx) = failover.watch().await.unwrap();
    mock.push().emit(&test_beacon(13));
    mock.push().emit(&test_beacon(12)); // late replay
    mock.push().emit(&test_beacon(13)); // duplicate
    mock.push().emit(&test_beacon(14));

    assert_eq!(rx.recv().await.unwrap().round, 13);
    assert_eq!(rx.recv().await.unwrap().round, 14);
    handle.stop().await;
}
