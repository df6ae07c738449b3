use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};

use faro_core::{Beacon, BeaconClient, BeaconInfo, BeaconStream, FaroError, StreamHandle};

/// Arrival skew of fetched beacons against the chain schedule, in seconds.
const FETCH_SKEW_SECONDS: &str = "faro_fetch_skew_seconds";
/// Arrival skew of watched beacons against the chain schedule, in seconds.
const WATCH_SKEW_SECONDS: &str = "faro_watch_skew_seconds";

/// Side-channel decorator observing delivery latency.
///
/// For every beacon observed on a success path it records
/// `observed_time - time_of_round(round)` as a histogram through the
/// [`metrics`] facade. Values, errors, and call timing pass through
/// untouched; the wrapper requires a resolved chain identity, which the
/// assembler enforces at construction.
pub struct LatencyClient {
    inner: Arc<dyn BeaconClient>,
    info: BeaconInfo,
}

impl LatencyClient {
    /// Wrap `inner`, observing skew against `info`'s schedule.
    #[must_use]
    pub fn new(inner: Arc<dyn BeaconClient>, info: BeaconInfo) -> Self {
        Self { inner, info }
    }

    fn record(histogram: &'static str, info: &BeaconInfo, beacon: &Beacon) {
        let expected = info.time_of_round(beacon.round);
        let skew = (Utc::now() - expected).num_milliseconds() as f64 / 1_000.0;
        metrics::histogram!(histogram).record(skew);
    }
}

#[async_trait]
impl BeaconClient for LatencyClient {
    async fn fetch(&self, round: u64) -> Result<Beacon, FaroError> {
        let outcome = self.inner.fetch(round).await;
        if let Ok(beacon) = &outcome {
            Self::record(FETCH_SKEW_SECONDS, &self.info, beacon);
        }
        outcome
    }

    async fn watch(&self) -> Result<BeaconStream, FaroError> {
        let (upstream, mut incoming) = self.inner.watch().await?;
        let info = self.info.clone();
        let (tx, rx) = mpsc::channel(32);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let join = tokio::spawn(async move {
            let _upstream = upstream;
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    maybe = incoming.recv() => match maybe {
                        Some(beacon) => {
                            Self::record(WATCH_SKEW_SECONDS, &info, &beacon);
                            if tx.send(beacon).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });
        Ok((StreamHandle::new(join, stop_tx), rx))
    }

    fn info(&self) -> &BeaconInfo {
        &self.info
    }

    async fn close(&self) -> Result<(), FaroError> {
        self.inner.close().await
    }
}
