use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::{mpsc, oneshot};

use faro_core::{
    Beacon, BeaconClient, BeaconInfo, BeaconStream, FaroError, LATEST_ROUND, StreamHandle,
};

type Outcome = Result<Beacon, FaroError>;

/// How a fetch enters the cache: served, parked behind the in-flight call
/// for the same round, or elected to perform the upstream call itself.
enum Admission {
    Hit(Beacon),
    Wait(oneshot::Receiver<Outcome>),
    Lead,
}

/// Bounded `round -> beacon` store with an explicit in-flight table.
///
/// Both the entry map and the in-flight table live behind one mutex, which
/// is what preserves the single-flight invariant: at most one upstream fetch
/// per round exists at any time, and every concurrent caller for that round
/// observes the same outcome. The lock is never held across an await.
///
/// Reads go through `peek` so a lookup does not refresh an entry's position;
/// eviction order is therefore insertion order, oldest first. Capacity 0
/// stores nothing but still coalesces.
pub struct RoundCache {
    state: Mutex<CacheState>,
}

struct CacheState {
    entries: Option<LruCache<u64, Beacon>>,
    in_flight: HashMap<u64, Vec<oneshot::Sender<Outcome>>>,
}

impl RoundCache {
    /// Create a cache holding at most `capacity` beacons.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: NonZeroUsize::new(capacity).map(LruCache::new),
                in_flight: HashMap::new(),
            }),
        }
    }

    /// Look up a stored beacon. Round 0 is the "latest" sentinel and never a
    /// key, so it always misses.
    #[must_use]
    pub fn get(&self, round: u64) -> Option<Beacon> {
        if round == LATEST_ROUND {
            return None;
        }
        let state = self.state.lock().unwrap();
        state.entries.as_ref().and_then(|m| m.peek(&round).cloned())
    }

    /// Store a beacon under its own (resolved) round number.
    pub fn put(&self, beacon: &Beacon) {
        if beacon.round == LATEST_ROUND {
            return;
        }
        let mut state = self.state.lock().unwrap();
        if let Some(entries) = state.entries.as_mut() {
            entries.put(beacon.round, beacon.clone());
        }
    }

    /// Number of beacons currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.entries.as_ref().map_or(0, LruCache::len)
    }

    /// `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn admit(&self, round: u64) -> Admission {
        let mut state = self.state.lock().unwrap();
        if round != LATEST_ROUND
            && let Some(hit) = state.entries.as_ref().and_then(|m| m.peek(&round).cloned())
        {
            return Admission::Hit(hit);
        }
        match state.in_flight.entry(round) {
            Entry::Occupied(mut e) => {
                let (tx, rx) = oneshot::channel();
                e.get_mut().push(tx);
                Admission::Wait(rx)
            }
            Entry::Vacant(e) => {
                e.insert(Vec::new());
                Admission::Lead
            }
        }
    }

    fn complete(&self, round: u64, outcome: &Outcome) {
        let mut state = self.state.lock().unwrap();
        if let Ok(beacon) = outcome
            && let Some(entries) = state.entries.as_mut()
        {
            // Stored under the resolved round, never under the sentinel.
            entries.put(beacon.round, beacon.clone());
        }
        if let Some(waiters) = state.in_flight.remove(&round) {
            for tx in waiters {
                let _ = tx.send(outcome.clone());
            }
        }
    }

    fn abandon(&self, round: u64) {
        let mut state = self.state.lock().unwrap();
        // Dropping the waiter senders wakes every parked caller; one of them
        // re-enters admission and becomes the new leader.
        state.in_flight.remove(&round);
    }
}

/// Removes the in-flight entry for a round unless the leader completed it.
///
/// A leader whose future is dropped mid-call must not leave the round wedged
/// behind an entry nobody will ever resolve.
struct Flight<'a> {
    cache: &'a RoundCache,
    round: u64,
    armed: bool,
}

impl<'a> Flight<'a> {
    const fn new(cache: &'a RoundCache, round: u64) -> Self {
        Self {
            cache,
            round,
            armed: true,
        }
    }

    fn complete(mut self, outcome: &Outcome) {
        self.armed = false;
        self.cache.complete(self.round, outcome);
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cache.abandon(self.round);
        }
    }
}

const WATCH_BUFFER: usize = 32;

/// Wraps any client with a [`RoundCache`].
///
/// Cache hits never touch the wrapped client; misses are coalesced so one
/// upstream call serves every concurrent caller for the same round, and only
/// clean successes are stored. "Latest" (round 0) requests coalesce
/// transiently at the delegate-call level and store under the round they
/// resolve to. Beacons arriving on the watch path are written into the cache
/// before being forwarded downstream.
pub struct CachingClient {
    inner: Arc<dyn BeaconClient>,
    cache: Arc<RoundCache>,
}

impl CachingClient {
    /// Wrap `inner` with the given (possibly shared) cache.
    #[must_use]
    pub fn new(inner: Arc<dyn BeaconClient>, cache: Arc<RoundCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl BeaconClient for CachingClient {
    async fn fetch(&self, round: u64) -> Result<Beacon, FaroError> {
        loop {
            match self.cache.admit(round) {
                Admission::Hit(beacon) => return Ok(beacon),
                Admission::Wait(rx) => match rx.await {
                    Ok(outcome) => return outcome,
                    // Leader abandoned mid-flight; take another turn.
                    Err(_) => continue,
                },
                Admission::Lead => {
                    let flight = Flight::new(&self.cache, round);
                    let outcome = self.inner.fetch(round).await;
                    flight.complete(&outcome);
                    return outcome;
                }
            }
        }
    }

    async fn watch(&self) -> Result<BeaconStream, FaroError> {
        let (upstream, mut incoming) = self.inner.watch().await?;
        let cache = Arc::clone(&self.cache);
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let join = tokio::spawn(async move {
            // Owns the upstream handle; dropping it on exit ends the source.
            let _upstream = upstream;
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    maybe = incoming.recv() => match maybe {
                        Some(beacon) => {
                            cache.put(&beacon);
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
        self.inner.info()
    }

    async fn close(&self) -> Result<(), FaroError> {
        self.inner.close().await
    }
}
