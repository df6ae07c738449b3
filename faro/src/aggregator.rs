use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use faro_core::{Beacon, BeaconClient, BeaconInfo, BeaconStream, FaroError, StreamHandle};

const SUBSCRIBER_BUFFER: usize = 16;
const MIN_RECONNECT: Duration = Duration::from_millis(500);
const MAX_RECONNECT: Duration = Duration::from_secs(30);

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Beacon>,
}

enum Upstream {
    Idle,
    Running,
}

struct AggState {
    subscribers: Vec<Subscriber>,
    upstream: Upstream,
    next_id: u64,
}

struct Shared {
    inner: Arc<dyn BeaconClient>,
    auto_watch: bool,
    closed: AtomicBool,
    state: Mutex<AggState>,
    // Bumped on every membership change and on close so the distributor
    // re-evaluates whether the upstream subscription is still needed.
    ping: watch::Sender<u64>,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.ping.send_modify(|n| *n = n.wrapping_add(1));
    }

    fn detach(&self, id: u64) {
        let mut state = self.state.lock().unwrap();
        state.subscribers.retain(|s| s.id != id);
        drop(state);
        self.bump();
    }

    /// Deliver one beacon to every live subscriber, in attach order.
    ///
    /// A congested subscriber skips this value; one whose receiver is gone is
    /// pruned. Slow consumers never stall the upstream or each other.
    fn fan_out(&self, beacon: &Beacon) {
        let mut state = self.state.lock().unwrap();
        state.subscribers.retain(|s| match s.tx.try_send(beacon.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(subscriber = s.id, round = beacon.round, "subscriber lagging; value skipped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    /// Atomically decide whether the distributor should shut down, and mark
    /// the upstream idle if so. Attach checks the same lock, so a subscriber
    /// either joins a live session or starts a fresh one; never neither.
    fn finish_if_unneeded(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if self.is_closed() || (state.subscribers.is_empty() && !self.auto_watch) {
            state.upstream = Upstream::Idle;
            true
        } else {
            false
        }
    }
}

/// One upstream subscription, any number of downstream subscribers.
///
/// The first attach (or an eager start under auto-watch) opens the single
/// upstream subscription; later attaches only add a subscriber. Values are
/// delivered in upstream order with no backfill. When the last subscriber
/// detaches the upstream closes, unless auto-watch keeps it open to keep the
/// cache below warm. A subscription that ends on its own while still needed
/// is reopened with capped backoff.
///
/// Stopping a subscriber's handle detaches it immediately; merely dropping
/// the receiver is also fine, the subscriber is reaped on the next delivery.
pub struct WatchAggregator {
    shared: Arc<Shared>,
}

impl WatchAggregator {
    /// Wrap `inner`; with `auto_watch` the upstream stays open even with
    /// zero subscribers (call [`ensure_upstream`](Self::ensure_upstream) to
    /// start it eagerly).
    #[must_use]
    pub fn new(inner: Arc<dyn BeaconClient>, auto_watch: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner,
                auto_watch,
                closed: AtomicBool::new(false),
                state: Mutex::new(AggState {
                    subscribers: Vec::new(),
                    upstream: Upstream::Idle,
                    next_id: 0,
                }),
                ping: watch::Sender::new(0),
            }),
        }
    }

    /// Open the upstream subscription now if it is not already running.
    pub fn ensure_upstream(&self) {
        let mut state = self.shared.state.lock().unwrap();
        if matches!(state.upstream, Upstream::Idle) && !self.shared.is_closed() {
            state.upstream = Upstream::Running;
            tokio::spawn(distribute(Arc::clone(&self.shared)));
        }
    }
}

/// The distributor: owns the upstream session for its lifetime.
async fn distribute(shared: Arc<Shared>) {
    let mut ping = shared.ping.subscribe();
    let mut backoff = MIN_RECONNECT;
    'session: loop {
        if shared.finish_if_unneeded() {
            return;
        }
        let (handle, mut incoming) = match shared.inner.watch().await {
            Ok(session) => {
                backoff = MIN_RECONNECT;
                session
            }
            Err(e) => {
                if e.is_cancelled() {
                    let mut state = shared.state.lock().unwrap();
                    state.upstream = Upstream::Idle;
                    return;
                }
                if shared.finish_if_unneeded() {
                    return;
                }
                warn!(error = %e, "upstream subscription failed; retrying");
                tokio::select! {
                    _ = ping.changed() => {}
                    () = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_RECONNECT);
                continue 'session;
            }
        };
        let mut handle = Some(handle);
        loop {
            tokio::select! {
                biased;
                _ = ping.changed() => {
                    if shared.finish_if_unneeded() {
                        if let Some(h) = handle.take() {
                            h.stop().await;
                        }
                        return;
                    }
                }
                maybe = incoming.recv() => match maybe {
                    Some(beacon) => {
                        shared.fan_out(&beacon);
                        if shared.finish_if_unneeded() {
                            if let Some(h) = handle.take() {
                                h.stop().await;
                            }
                            return;
                        }
                    }
                    None => {
                        if let Some(h) = handle.take() {
                            h.stop().await;
                        }
                        if shared.finish_if_unneeded() {
                            return;
                        }
                        debug!("upstream subscription ended; reopening");
                        tokio::select! {
                            _ = ping.changed() => {}
                            () = tokio::time::sleep(backoff) => {}
                        }
                        backoff = (backoff * 2).min(MAX_RECONNECT);
                        continue 'session;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl BeaconClient for WatchAggregator {
    async fn fetch(&self, round: u64) -> Result<Beacon, FaroError> {
        if self.shared.is_closed() {
            return Err(FaroError::Cancelled);
        }
        self.shared.inner.fetch(round).await
    }

    async fn watch(&self) -> Result<BeaconStream, FaroError> {
        if self.shared.is_closed() {
            return Err(FaroError::Cancelled);
        }
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = {
            let mut state = self.shared.state.lock().unwrap();
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.push(Subscriber { id, tx });
            if matches!(state.upstream, Upstream::Idle) {
                state.upstream = Upstream::Running;
                tokio::spawn(distribute(Arc::clone(&self.shared)));
            }
            id
        };

        let shared = Arc::clone(&self.shared);
        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(async move {
            let _ = stop_rx.await;
            shared.detach(id);
        });
        Ok((StreamHandle::new(join, stop_tx), rx))
    }

    fn info(&self) -> &BeaconInfo {
        self.shared.inner.info()
    }

    async fn close(&self) -> Result<(), FaroError> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        {
            let mut state = self.shared.state.lock().unwrap();
            state.subscribers.clear();
        }
        self.shared.bump();
        self.shared.inner.close().await
    }
}
