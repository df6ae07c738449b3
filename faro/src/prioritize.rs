use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use faro_core::{
    Beacon, BeaconClient, BeaconInfo, BeaconStream, BeaconVerifier, Endpoint, FaroError,
    LATEST_ROUND, StreamHandle,
};

const POLL_BUFFER: usize = 32;

/// Tuning knobs for the endpoint race.
#[derive(Clone, Copy, Debug)]
pub struct RaceConfig {
    /// Bound applied to every individual endpoint call.
    pub endpoint_timeout: Duration,
    /// Head start granted to each endpoint over the next one in preference
    /// order. Zero fans out to everything at once.
    pub fan_out_stagger: Duration,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            endpoint_timeout: Duration::from_secs(5),
            fan_out_stagger: Duration::from_millis(500),
        }
    }
}

/// Per-endpoint health observations feeding the preference order.
///
/// Endpoints are never excluded; a failing endpoint merely sinks in the
/// ordering until it recovers.
#[derive(Clone, Copy, Debug, Default)]
struct EndpointHealth {
    ewma_latency_ms: f64,
    consecutive_failures: u32,
}

impl EndpointHealth {
    /// An endpoint is unmeasured until its first recorded success. Measured
    /// endpoints rank ahead of unmeasured ones, so an abandoned slowpoke
    /// does not keep its head start just because it never finished a call.
    fn is_unmeasured(&self) -> bool {
        self.ewma_latency_ms == 0.0
    }
}

/// Ensure an error reaching the aggregate carries its endpoint name.
fn tag_err(endpoint: &str, e: FaroError) -> FaroError {
    match e {
        e @ (FaroError::Endpoint { .. }
        | FaroError::EndpointTimeout { .. }
        | FaroError::InvalidBeacon { .. }
        | FaroError::AllEndpointsFailed(_)
        | FaroError::Cancelled) => e,
        other => FaroError::endpoint(endpoint, other.to_string()),
    }
}

struct Shared {
    endpoints: Vec<Arc<dyn Endpoint>>,
    info: BeaconInfo,
    verifier: Arc<dyn BeaconVerifier>,
    health: Mutex<Vec<EndpointHealth>>,
    race: RaceConfig,
    closed: watch::Sender<bool>,
}

impl Shared {
    /// Endpoint indices in current preference order: fewest consecutive
    /// failures first, then lowest observed latency, then registration order.
    fn ranked(&self) -> Vec<usize> {
        let health = self.health.lock().unwrap();
        let mut order: Vec<usize> = (0..self.endpoints.len()).collect();
        order.sort_by(|&a, &b| {
            health[a]
                .consecutive_failures
                .cmp(&health[b].consecutive_failures)
                .then(health[a].is_unmeasured().cmp(&health[b].is_unmeasured()))
                .then(health[a].ewma_latency_ms.total_cmp(&health[b].ewma_latency_ms))
                .then(a.cmp(&b))
        });
        order
    }

    fn record_success(&self, idx: usize, elapsed: Duration) {
        let mut health = self.health.lock().unwrap();
        let h = &mut health[idx];
        let ms = elapsed.as_secs_f64() * 1_000.0;
        h.consecutive_failures = 0;
        h.ewma_latency_ms = if h.ewma_latency_ms == 0.0 {
            ms
        } else {
            0.8 * h.ewma_latency_ms + 0.2 * ms
        };
    }

    fn record_failure(&self, idx: usize) {
        let mut health = self.health.lock().unwrap();
        health[idx].consecutive_failures += 1;
    }

    fn validated(&self, requested: u64, name: &str, beacon: Beacon) -> Result<Beacon, FaroError> {
        if requested != LATEST_ROUND && beacon.round != requested {
            return Err(FaroError::invalid_beacon(
                name,
                format!("answered round {} for round {requested}", beacon.round),
            ));
        }
        self.verifier
            .verify(&self.info, &beacon)
            .map_err(|e| FaroError::invalid_beacon(name, e.to_string()))?;
        Ok(beacon)
    }

    async fn fetch(&self, round: u64) -> Result<Beacon, FaroError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(FaroError::Cancelled);
        }

        let mut attempts = FuturesUnordered::new();
        for (rank, idx) in self.ranked().into_iter().enumerate() {
            let endpoint = Arc::clone(&self.endpoints[idx]);
            let head_start = self.race.fan_out_stagger.checked_mul(rank as u32);
            let timeout = self.race.endpoint_timeout;
            attempts.push(async move {
                if let Some(delay) = head_start.filter(|d| !d.is_zero()) {
                    tokio::time::sleep(delay).await;
                }
                let started = Instant::now();
                let result = match tokio::time::timeout(timeout, endpoint.fetch(round)).await {
                    Ok(r) => r,
                    Err(_) => Err(FaroError::endpoint_timeout(endpoint.name())),
                };
                (idx, endpoint, started.elapsed(), result)
            });
        }

        let mut errors = Vec::new();
        loop {
            tokio::select! {
                biased;
                changed = closed.changed() => {
                    if changed.is_err() || *closed.borrow() {
                        return Err(FaroError::Cancelled);
                    }
                }
                maybe = attempts.next() => {
                    let Some((idx, endpoint, elapsed, result)) = maybe else { break };
                    match result.and_then(|b| self.validated(round, endpoint.name(), b)) {
                        Ok(beacon) => {
                            self.record_success(idx, elapsed);
                            // Dropping `attempts` abandons the losers.
                            return Ok(beacon);
                        }
                        Err(e) => {
                            self.record_failure(idx);
                            debug!(endpoint = endpoint.name(), error = %e, "endpoint attempt failed");
                            errors.push(tag_err(endpoint.name(), e));
                        }
                    }
                }
            }
        }
        Err(FaroError::AllEndpointsFailed(errors))
    }

    /// Time left until the next round is due on this chain's schedule.
    fn until_next_round(&self) -> Duration {
        let now = Utc::now();
        let next = self.info.time_of_round(self.info.round_at(now) + 1);
        (next - now).to_std().unwrap_or_default()
    }
}

/// Poll the racing fetch path at round boundaries, emitting each new round
/// once. This is the watch implementation for endpoint sets without a native
/// push capability.
fn spawn_polling_watch(shared: Arc<Shared>) -> BeaconStream {
    let (tx, rx) = mpsc::channel(POLL_BUFFER);
    let (stop_tx, mut stop_rx) = oneshot::channel();
    let join = tokio::spawn(async move {
        let mut closed = shared.closed.subscribe();
        let mut last_round = 0u64;
        loop {
            let wait = shared.until_next_round();
            tokio::select! {
                biased;
                _ = &mut stop_rx => return,
                changed = closed.changed() => {
                    if changed.is_err() || *closed.borrow() {
                        return;
                    }
                }
                () = tokio::time::sleep(wait) => {
                    match shared.fetch(LATEST_ROUND).await {
                        Ok(beacon) if beacon.round > last_round => {
                            last_round = beacon.round;
                            if tx.send(beacon).await.is_err() {
                                return;
                            }
                        }
                        Ok(_) => {}
                        Err(e) if e.is_cancelled() => return,
                        Err(e) => debug!(error = %e, "poll for latest round failed"),
                    }
                }
            }
        }
    });
    (StreamHandle::new(join, stop_tx), rx)
}

/// Races fetch requests across an ordered, immutable set of endpoints.
///
/// The preferred endpoint starts first; the rest join staggered so a healthy
/// source usually answers alone while a slow or broken one is overtaken. The
/// first response that succeeds and verifies wins and everything else is
/// abandoned. A response failing verification counts as that endpoint's
/// failure, never as a terminal error: the race goes on until somebody wins
/// or everybody has lost, which surfaces as
/// [`FaroError::AllEndpointsFailed`].
///
/// Outcome latency and success feed an adaptive preference order for future
/// calls.
pub struct PrioritizingClient {
    shared: Arc<Shared>,
}

impl PrioritizingClient {
    /// Build over an ordered endpoint set; `info` is the identity every
    /// response is validated against.
    #[must_use]
    pub fn new(
        endpoints: Vec<Arc<dyn Endpoint>>,
        info: BeaconInfo,
        verifier: Arc<dyn BeaconVerifier>,
        race: RaceConfig,
    ) -> Self {
        let health = vec![EndpointHealth::default(); endpoints.len()];
        Self {
            shared: Arc::new(Shared {
                endpoints,
                info,
                verifier,
                health: Mutex::new(health),
                race,
                closed: watch::Sender::new(false),
            }),
        }
    }
}

#[async_trait]
impl BeaconClient for PrioritizingClient {
    async fn fetch(&self, round: u64) -> Result<Beacon, FaroError> {
        self.shared.fetch(round).await
    }

    async fn watch(&self) -> Result<BeaconStream, FaroError> {
        if *self.shared.closed.borrow() {
            return Err(FaroError::Cancelled);
        }
        // Prefer a native push subscription when any endpoint offers one.
        for idx in self.shared.ranked() {
            if let Some(watcher) = self.shared.endpoints[idx].as_watcher() {
                return watcher.watch().await;
            }
        }
        Ok(spawn_polling_watch(Arc::clone(&self.shared)))
    }

    fn info(&self) -> &BeaconInfo {
        &self.shared.info
    }

    async fn close(&self) -> Result<(), FaroError> {
        if self.shared.closed.send_replace(true) {
            return Ok(());
        }
        let mut first_err = None;
        for endpoint in &self.shared.endpoints {
            if let Err(e) = endpoint.close().await {
                warn!(endpoint = endpoint.name(), error = %e, "endpoint close failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
