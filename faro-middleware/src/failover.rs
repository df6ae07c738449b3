use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use faro_core::{Beacon, BeaconClient, BeaconInfo, BeaconStream, FaroError, StreamHandle};

const FORWARD_BUFFER: usize = 32;

/// Latency safety net for push subscriptions.
///
/// Supervises the wrapped client's watch stream against the chain schedule:
/// when no beacon has been observed by the expected arrival time of the next
/// round plus the grace period, it fetches the current round through the
/// wrapped client (and therefore through the cache below it) and emits the
/// result downstream as if it had been pushed. The next genuine push simply
/// resets the marker; this is not a mode switch.
///
/// Failover never tears the stream down: a failed or timed-out substitution
/// is logged and swallowed, and each round is delivered downstream at most
/// once, in increasing order.
pub struct FailoverWatcher {
    inner: Arc<dyn BeaconClient>,
    info: BeaconInfo,
    grace: Duration,
}

impl FailoverWatcher {
    /// Wrap `inner`. `grace` must be non-zero; the assembler skips this layer
    /// entirely when failover is disabled.
    #[must_use]
    pub fn new(inner: Arc<dyn BeaconClient>, info: BeaconInfo, grace: Duration) -> Self {
        Self { inner, info, grace }
    }

    /// Time left until the next round is due, plus the grace period.
    fn patience(info: &BeaconInfo, grace: Duration) -> Duration {
        let now = Utc::now();
        let next = info.time_of_round(info.round_at(now) + 1);
        let until_next = (next - now).to_std().unwrap_or_default();
        until_next + grace
    }
}

#[async_trait]
impl BeaconClient for FailoverWatcher {
    async fn fetch(&self, round: u64) -> Result<Beacon, FaroError> {
        self.inner.fetch(round).await
    }

    async fn watch(&self) -> Result<BeaconStream, FaroError> {
        let (upstream, mut incoming) = self.inner.watch().await?;
        let inner = Arc::clone(&self.inner);
        let info = self.info.clone();
        let grace = self.grace;
        let (tx, rx) = mpsc::channel(FORWARD_BUFFER);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let join = tokio::spawn(async move {
            let _upstream = upstream;
            let mut last_round = 0u64;
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    maybe = incoming.recv() => match maybe {
                        Some(beacon) => {
                            if beacon.round > last_round {
                                last_round = beacon.round;
                                if tx.send(beacon).await.is_err() {
                                    break;
                                }
                            }
                        }
                        None => break,
                    },
                    () = tokio::time::sleep(Self::patience(&info, grace)) => {
                        let round = info.round_at(Utc::now());
                        if round <= last_round {
                            continue;
                        }
                        // One period bounds the substitution so a hung fetch
                        // cannot stall the next liveness check.
                        let bound = info.period().max(grace);
                        match tokio::time::timeout(bound, inner.fetch(round)).await {
                            Ok(Ok(beacon)) if beacon.round > last_round => {
                                last_round = beacon.round;
                                if tx.send(beacon).await.is_err() {
                                    break;
                                }
                            }
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) if e.is_cancelled() => break,
                            Ok(Err(e)) => {
                                debug!(round, error = %e, "failover fetch failed; stream stays open");
                            }
                            Err(_) => {
                                debug!(round, "failover fetch timed out; stream stays open");
                            }
                        }
                    }
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
