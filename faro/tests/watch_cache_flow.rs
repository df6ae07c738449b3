use std::sync::Arc;
use std::time::Duration;

use faro::{BeaconInfo, Faro, Watcher};
use faro_mock::{MockEndpoint, MockPush, test_beacon, test_info};
use tokio::time::sleep;

fn info() -> BeaconInfo {
    test_info(0, 30)
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {what}");
}

#[tokio::test(flavor = "multi_thread")]
async fn streamed_values_serve_later_fetches_without_network() {
    let push = MockPush::new();
    let ep = MockEndpoint::builder()
        .info(info())
        .latest(3)
        .with_push(push.clone())
        .build();

    let client = Faro::builder()
        .with_endpoint(Arc::new(ep.clone()))
        .chain_info(info())
        .build()
        .await
        .unwrap();

    let (handle, mut rx) = client.watch().await.unwrap();
    wait_until("push session", || push.opened() == 1).await;

    push.emit(&test_beacon(4));
    let streamed = rx.recv().await.unwrap();
    assert_eq!(streamed.round, 4);

    let fetched = client.fetch(4).await.unwrap();
    assert_eq!(fetched.randomness, streamed.randomness);
    assert_eq!(ep.fetch_count(), 0, "the streamed round must be a cache hit");

    handle.stop().await;
    client.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn custom_watcher_substitutes_the_push_path() {
    let push = MockPush::new();
    let ep = MockEndpoint::builder().info(info()).latest(3).build(); // no native push

    let client = Faro::builder()
        .with_endpoint(Arc::new(ep.clone()))
        .chain_info(info())
        .with_watcher({
            let push = push.clone();
            move |_info, _cache| Ok(Arc::new(push) as Arc<dyn Watcher>)
        })
        .build()
        .await
        .unwrap();

    let (handle, mut rx) = client.watch().await.unwrap();
    wait_until("watcher session", || push.opened() == 1).await;

    push.emit(&test_beacon(5));
    assert_eq!(rx.recv().await.unwrap().round, 5);

    // Values from the substituted watcher flow through the cache too.
    let fetched = client.fetch(5).await.unwrap();
    assert_eq!(fetched, test_beacon(5));
    assert_eq!(ep.fetch_count(), 0);

    handle.stop().await;
    client.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn auto_watch_warms_the_cache_with_no_subscribers() {
    let push = MockPush::new();
    let ep = MockEndpoint::builder()
        .info(info())
        .latest(10)
        .with_push(push.clone())
        .build();

    let client = Faro::builder()
        .with_endpoint(Arc::new(ep.clone()))
        .chain_info(info())
        .auto_watch()
        .build()
        .await
        .unwrap();

    wait_until("eager subscription", || push.opened() == 1).await;
    push.emit(&test_beacon(4));
    sleep(Duration::from_millis(50)).await;

    let beacon = client.fetch(4).await.unwrap();
    assert_eq!(beacon.round, 4);
    assert_eq!(ep.fetch_count(), 0, "auto-watch should have cached the round already");

    client.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn polling_watch_streams_new_rounds_when_no_push_exists() {
    // 1s period so the poller ticks quickly in real time.
    let info = test_info(chrono::Utc::now().timestamp(), 1);
    let ep = MockEndpoint::builder().info(info.clone()).latest(1).build();

    let client = Faro::builder()
        .with_endpoint(Arc::new(ep.clone()))
        .chain_info(info)
        .build()
        .await
        .unwrap();

    let (handle, mut rx) = client.watch().await.unwrap();
    ep.set_latest(2);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(8);
    loop {
        let beacon = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .expect("poller should produce beacons within a few periods")
            .unwrap();
        assert!(beacon.round >= 1);
        if beacon.round >= 2 {
            break;
        }
        ep.set_latest(3);
    }

    handle.stop().await;
    client.close().await.unwrap();
}
