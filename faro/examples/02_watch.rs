mod common;

use std::time::Duration;

use faro::Faro;
use faro_mock::test_beacon;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let (endpoints, info, push) = common::demo_endpoints();
    let mut builder = Faro::builder()
        .chain_info(info)
        .failover_grace_period(Duration::from_secs(6));
    for ep in endpoints {
        builder = builder.with_endpoint(ep);
    }
    let client = builder.build().await?;

    println!("streaming beacons... (running for ~3s)");
    let (handle, mut rx) = client.watch().await?;

    // Drive the mock push source in the background.
    let feeder = tokio::spawn(async move {
        for round in 31..=40u64 {
            tokio::time::sleep(Duration::from_millis(250)).await;
            push.emit(&test_beacon(round));
        }
    });

    let printer = tokio::spawn(async move {
        let mut count = 0usize;
        while let Some(beacon) = rx.recv().await {
            println!("round {}: {} bytes of randomness", beacon.round, beacon.randomness.len());
            count += 1;
            if count >= 10 {
                break;
            }
        }
        count
    });

    tokio::time::sleep(Duration::from_secs(3)).await;
    handle.stop().await;
    let _ = feeder.await;
    let delivered = printer.await?;
    println!("delivered {delivered} beacons");

    client.close().await?;
    Ok(())
}
