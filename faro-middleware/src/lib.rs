//! faro-middleware
//!
//! Decorating layers for `BeaconClient` implementations. Each wrapper takes
//! an inner `Arc<dyn BeaconClient>` and returns the same capability surface
//! with one concern added:
//!
//! - [`cache::CachingClient`]: bounded round cache with single-flight
//!   request coalescing; beacons seen on the watch path land in the cache.
//! - [`failover::FailoverWatcher`]: substitutes explicit fetches when push
//!   delivery stalls past a grace period.
//! - [`latency::LatencyClient`]: records arrival skew against the chain
//!   schedule; side-channel only.
//!
//! Assembly order matters and is owned by the `faro` crate's builder:
//! failover wraps above caching (substituted values get cached) and the
//! aggregator sits above failover.
#![warn(missing_docs)]

/// Bounded round cache and the caching client wrapper.
pub mod cache;
/// Push-to-poll failover supervision.
pub mod failover;
/// Arrival-skew observation.
pub mod latency;

pub use cache::{CachingClient, RoundCache};
pub use failover::FailoverWatcher;
pub use latency::LatencyClient;
