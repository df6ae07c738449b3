use std::sync::Arc;
use std::time::Duration;

use faro::Endpoint;
use faro_mock::{MockEndpoint, MockPush, test_info};

/// Deterministic endpoints for CI-safe examples: one fast source with a push
/// capability and one slow source, both serving the same mock chain.
#[allow(dead_code)]
pub fn demo_endpoints() -> (Vec<Arc<dyn Endpoint>>, faro::BeaconInfo, MockPush) {
    let info = test_info(chrono_now() - 90, 3);
    let push = MockPush::new();
    let primary = MockEndpoint::builder()
        .name("primary")
        .info(info.clone())
        .latest(30)
        .with_push(push.clone())
        .build();
    let backup = MockEndpoint::builder()
        .name("backup")
        .info(info.clone())
        .latest(30)
        .delay(Duration::from_millis(150))
        .build();
    let endpoints: Vec<Arc<dyn Endpoint>> = vec![Arc::new(primary), Arc::new(backup)];
    (endpoints, info, push)
}

fn chrono_now() -> i64 {
    chrono::Utc::now().timestamp()
}
