mod common;

use faro::Faro;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // 1. Deterministic mock endpoints so the example runs anywhere.
    let (endpoints, info, _push) = common::demo_endpoints();

    // 2. Assemble the client; the slow endpoint is only raced when the fast
    //    one lags.
    let mut builder = Faro::builder().chain_info(info);
    for ep in endpoints {
        builder = builder.with_endpoint(ep);
    }
    let client = builder.build().await?;

    // 3. Fetch the most recent beacon, then a specific round. The second
    //    fetch of round 7 is served from the local cache.
    let latest = client.latest().await?;
    println!(
        "latest round {}: {}",
        latest.round,
        hex(&latest.randomness)
    );

    let seven = client.fetch(7).await?;
    println!("round 7: {}", hex(&seven.randomness));
    let again = client.fetch(7).await?;
    assert_eq!(seven, again);

    client.close().await?;
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
