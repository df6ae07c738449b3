//! Faro turns N independently reachable, partially-trusted randomness-beacon
//! endpoints into one resilient client.
//!
//! Overview
//! - Races fetch requests across endpoints with staggered fan-out and takes
//!   the first response that verifies; endpoint health adapts the order.
//! - Caches fetched beacons locally with single-flight coalescing, so a
//!   thundering herd for one round costs one upstream call.
//! - Multiplexes one upstream subscription to any number of `watch` callers;
//!   slow consumers miss values rather than stalling anyone else.
//! - Substitutes explicit fetches when push delivery stalls past a grace
//!   period; the stream itself never dies because a source went quiet.
//! - Optionally records delivery-latency histograms, purely as a side
//!   channel.
//!
//! Key behaviors and trade-offs
//! - Fan-out stagger: a short stagger keeps load on the preferred endpoint
//!   and still caps tail latency; zero stagger races everything at once at
//!   the cost of N-fold request load.
//! - Cache capacity bounds memory; eviction is oldest-inserted-first, which
//!   suits an append-only stream of rounds better than recency.
//! - Auto-watch keeps the cache warm with zero subscribers, trading an idle
//!   subscription for instant fetches.
//! - Failover grace: shorter fills gaps sooner but can duplicate load when
//!   the beacon is merely jittery.
//!
//! Example
//! ```rust,ignore
//! use std::time::Duration;
//! use faro::Faro;
//!
//! let client = Faro::builder()
//!     .http_endpoints(&["https://api.drand.sh", "https://drand.cloudflare.com"])
//!     .chain_hash(hex::decode("8990e7a9aaed2ffe...")?)
//!     .failover_grace_period(Duration::from_secs(5))
//!     .build()
//!     .await?;
//!
//! let beacon = client.latest().await?;
//! println!("round {}: {}", beacon.round, hex::encode(&beacon.randomness));
//!
//! let (handle, mut rx) = client.watch().await?;
//! while let Some(beacon) = rx.recv().await {
//!     // one value per round, in order
//! }
//! handle.stop().await;
//! ```
//!
//! See `faro/examples/` for runnable end-to-end demonstrations.
#![warn(missing_docs)]

mod aggregator;
pub(crate) mod core;
mod prioritize;

pub use crate::core::{DEFAULT_CACHE_SIZE, Faro, FaroBuilder, WatcherCtor};
pub use aggregator::WatchAggregator;
pub use prioritize::{PrioritizingClient, RaceConfig};

pub use faro_http::HttpEndpoint;
pub use faro_middleware::{CachingClient, FailoverWatcher, LatencyClient, RoundCache};

// Re-export core types for convenience
pub use faro_core::{
    Beacon, BeaconClient, BeaconInfo, BeaconStream, BeaconVerifier, Endpoint, FaroError,
    InsecureVerifier, LATEST_ROUND, RandomnessVerifier, StreamHandle, Watcher,
};
