use std::sync::Arc;
use std::time::Duration;

use faro::{BeaconInfo, Faro, FaroError};
use faro_mock::{MockEndpoint, MockPush, test_info};
use tokio::time::sleep;

fn info() -> BeaconInfo {
    test_info(0, 30)
}

#[tokio::test(flavor = "multi_thread")]
async fn close_preempts_an_in_flight_fetch_with_cancellation() {
    let ep = MockEndpoint::builder()
        .info(info())
        .latest(10)
        .delay(Duration::from_millis(500))
        .build();
    let client = Faro::builder()
        .with_endpoint(Arc::new(ep.clone()))
        .chain_info(info())
        .build()
        .await
        .unwrap();

    let in_flight = {
        let client = client.clone();
        tokio::spawn(async move { client.fetch(5).await })
    };
    sleep(Duration::from_millis(50)).await;

    client.close().await.unwrap();
    let err = in_flight.await.unwrap().unwrap_err();
    assert!(
        matches!(err, FaroError::Cancelled),
        "closure must surface as cancellation, not transport or exhaustion; got {err:?}"
    );
    assert_eq!(ep.close_count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_after_close_fails_immediately() {
    let ep = MockEndpoint::builder().info(info()).latest(10).build();
    let client = Faro::builder()
        .with_endpoint(Arc::new(ep.clone()))
        .chain_info(info())
        .build()
        .await
        .unwrap();

    client.close().await.unwrap();
    assert!(matches!(
        client.fetch(1).await.unwrap_err(),
        FaroError::Cancelled
    ));
    assert_eq!(ep.fetch_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn dropping_a_fetch_future_leaves_no_cache_entry() {
    let ep = MockEndpoint::builder()
        .info(info())
        .latest(10)
        .delay(Duration::from_millis(200))
        .build();
    let client = Faro::builder()
        .with_endpoint(Arc::new(ep.clone()))
        .chain_info(info())
        .build()
        .await
        .unwrap();

    let doomed = {
        let client = client.clone();
        tokio::spawn(async move { client.fetch(5).await })
    };
    sleep(Duration::from_millis(30)).await;
    doomed.abort();

    // Nothing was stored by the abandoned call: the retry goes upstream.
    let beacon = client.fetch(5).await.unwrap();
    assert_eq!(beacon.round, 5);
    assert_eq!(ep.fetch_count(), 2);

    client.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn watch_streams_close_when_the_client_closes() {
    let push = MockPush::new();
    let ep = MockEndpoint::builder()
        .info(info())
        .latest(10)
        .with_push(push.clone())
        .build();
    let client = Faro::builder()
        .with_endpoint(Arc::new(ep))
        .chain_info(info())
        .build()
        .await
        .unwrap();

    let (_handle, mut rx) = client.watch().await.unwrap();
    client.close().await.unwrap();

    assert!(rx.recv().await.is_none());
    assert!(matches!(
        client.watch().await.unwrap_err(),
        FaroError::Cancelled
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn close_is_idempotent_and_concurrency_safe() {
    let ep = MockEndpoint::builder().info(info()).latest(10).build();
    let client = Faro::builder()
        .with_endpoint(Arc::new(ep.clone()))
        .chain_info(info())
        .build()
        .await
        .unwrap();

    let mut closers = Vec::new();
    for _ in 0..4 {
        let client = client.clone();
        closers.push(tokio::spawn(async move { client.close().await }));
    }
    for closer in closers {
        closer.await.unwrap().unwrap();
    }
    assert_eq!(ep.close_count(), 1);
}
