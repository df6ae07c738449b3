//! Mock beacon sources for CI-safe tests and examples.
//!
//! Provides deterministic fixtures (`test_info`, `test_beacon`), a scriptable
//! [`MockEndpoint`] implementing the `Endpoint` collaborator boundary, a
//! scriptable [`MockClient`] implementing the full `BeaconClient` capability
//! interface, and [`MockPush`], a manually driven push source shared by both.
//!
//! All mocks are cheaply cloneable handles over shared state, so a test can
//! keep a clone for assertions after moving the mock into a builder.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, oneshot};

use faro_core::{
    Beacon, BeaconClient, BeaconInfo, BeaconStream, Endpoint, FaroError, LATEST_ROUND,
    StreamHandle, Watcher,
};

/// Deterministic chain identity for tests.
///
/// The hash is derived from the schedule parameters, so two fixtures with
/// different parameters never collide.
#[must_use]
pub fn test_info(genesis_time: i64, period_seconds: u64) -> BeaconInfo {
    let mut hasher = Sha256::new();
    hasher.update(b"faro-mock-chain");
    hasher.update(genesis_time.to_be_bytes());
    hasher.update(period_seconds.to_be_bytes());
    BeaconInfo {
        public_key: vec![0x42; 48],
        period_seconds,
        genesis_time,
        hash: hasher.finalize().to_vec(),
        scheme_id: Some("mock".to_string()),
    }
}

/// Deterministic beacon for a round.
///
/// The randomness is the SHA-256 digest of the signature, so the fixture
/// passes `RandomnessVerifier` unmodified.
#[must_use]
pub fn test_beacon(round: u64) -> Beacon {
    let signature = Sha256::digest(round.to_be_bytes()).to_vec();
    let randomness = Sha256::digest(&signature).to_vec();
    Beacon {
        round,
        randomness,
        signature,
        previous_signature: None,
    }
}

/// A push source driven from the outside.
///
/// Each `watch` call opens one session; `emit` fans a beacon into every live
/// session; `end_sessions` ends all open streams (simulating an upstream
/// disconnect).
#[derive(Clone, Default)]
pub struct MockPush {
    state: Arc<Mutex<PushState>>,
}

#[derive(Default)]
struct PushState {
    sessions: Vec<mpsc::Sender<Beacon>>,
    opened: usize,
}

impl MockPush {
    /// Create a push source with no sessions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a beacon to every live session; returns how many received it.
    ///
    /// Sessions whose receiver has been dropped are pruned; congested
    /// sessions skip the value rather than blocking.
    pub fn emit(&self, beacon: &Beacon) -> usize {
        let mut state = self.state.lock().unwrap();
        state.sessions.retain(|tx| !tx.is_closed());
        let mut delivered = 0;
        for tx in &state.sessions {
            if tx.try_send(beacon.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// End every open session by dropping its sender.
    pub fn end_sessions(&self) {
        self.state.lock().unwrap().sessions.clear();
    }

    /// Total number of `watch` calls ever made against this source.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    /// Number of sessions whose receiver is still alive.
    #[must_use]
    pub fn active(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.sessions.retain(|tx| !tx.is_closed());
        state.sessions.len()
    }
}

#[async_trait]
impl Watcher for MockPush {
    async fn watch(&self) -> Result<BeaconStream, FaroError> {
        let (tx, rx) = mpsc::channel(32);
        {
            let mut state = self.state.lock().unwrap();
            state.sessions.push(tx);
            state.opened += 1;
        }
        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(async move {
            let _ = stop_rx.await;
        });
        Ok((StreamHandle::new(join, stop_tx), rx))
    }
}

struct SourceState {
    name: String,
    info: BeaconInfo,
    delay: Duration,
    latest: AtomicU64,
    fail: AtomicBool,
    overrides: Mutex<HashMap<u64, Beacon>>,
    fetches: AtomicUsize,
    info_calls: AtomicUsize,
    close_calls: AtomicUsize,
    closed: AtomicBool,
    push: Option<MockPush>,
}

impl SourceState {
    async fn fetch(&self, round: u64) -> Result<Beacon, FaroError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(FaroError::Cancelled);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(FaroError::endpoint(&self.name, "forced failure"));
        }
        let latest = self.latest.load(Ordering::SeqCst);
        let resolved = if round == LATEST_ROUND { latest } else { round };
        if resolved == 0 || resolved > latest {
            return Err(FaroError::endpoint(
                &self.name,
                format!("round {resolved} not produced yet"),
            ));
        }
        let overridden = self.overrides.lock().unwrap().get(&resolved).cloned();
        Ok(overridden.unwrap_or_else(|| test_beacon(resolved)))
    }
}

/// Scriptable implementation of the `Endpoint` collaborator boundary.
///
/// Serves deterministic [`test_beacon`] values up to a configurable latest
/// round, with optional per-call delay, forced failures, per-round overrides
/// (for corrupt-beacon scenarios), and an optional push capability.
#[derive(Clone)]
pub struct MockEndpoint {
    state: Arc<SourceState>,
}

impl MockEndpoint {
    /// Start building a mock endpoint.
    #[must_use]
    pub fn builder() -> MockEndpointBuilder {
        MockEndpointBuilder::new()
    }

    /// Number of `fetch` calls observed so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.state.fetches.load(Ordering::SeqCst)
    }

    /// Number of `chain_info` calls observed so far.
    #[must_use]
    pub fn info_count(&self) -> usize {
        self.state.info_calls.load(Ordering::SeqCst)
    }

    /// Number of `close` calls observed so far.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    /// Flip forced-failure mode at runtime.
    pub fn set_fail(&self, fail: bool) {
        self.state.fail.store(fail, Ordering::SeqCst);
    }

    /// Move the most recently produced round forward (or backward).
    pub fn set_latest(&self, round: u64) {
        self.state.latest.store(round, Ordering::SeqCst);
    }

    /// The push controller, when built with one.
    #[must_use]
    pub fn push(&self) -> Option<&MockPush> {
        self.state.push.as_ref()
    }
}

#[async_trait]
impl Endpoint for MockEndpoint {
    fn name(&self) -> &str {
        &self.state.name
    }

    async fn fetch(&self, round: u64) -> Result<Beacon, FaroError> {
        self.state.fetch(round).await
    }

    async fn chain_info(&self) -> Result<BeaconInfo, FaroError> {
        self.state.info_calls.fetch_add(1, Ordering::SeqCst);
        if !self.state.delay.is_zero() {
            tokio::time::sleep(self.state.delay).await;
        }
        if self.state.fail.load(Ordering::SeqCst) {
            return Err(FaroError::endpoint(&self.state.name, "forced failure"));
        }
        Ok(self.state.info.clone())
    }

    fn as_watcher(&self) -> Option<&dyn Watcher> {
        self.state.push.as_ref().map(|p| p as &dyn Watcher)
    }

    async fn close(&self) -> Result<(), FaroError> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        self.state.closed.store(true, Ordering::SeqCst);
        if let Some(push) = &self.state.push {
            push.end_sessions();
        }
        Ok(())
    }
}

/// Builder for [`MockEndpoint`].
pub struct MockEndpointBuilder {
    name: String,
    info: BeaconInfo,
    delay: Duration,
    latest: u64,
    fail: bool,
    overrides: HashMap<u64, Beacon>,
    push: Option<MockPush>,
}

impl Default for MockEndpointBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEndpointBuilder {
    /// Defaults: name `mock`, 30s period starting at unix 0, latest round 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            info: test_info(0, 30),
            delay: Duration::ZERO,
            latest: 1,
            fail: false,
            overrides: HashMap::new(),
            push: None,
        }
    }

    /// Endpoint name used in errors and health tracking.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Chain identity this endpoint claims to serve.
    #[must_use]
    pub fn info(mut self, info: BeaconInfo) -> Self {
        self.info = info;
        self
    }

    /// Artificial latency applied to every call.
    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Most recently produced round.
    #[must_use]
    pub const fn latest(mut self, round: u64) -> Self {
        self.latest = round;
        self
    }

    /// Make every call fail until `set_fail(false)`.
    #[must_use]
    pub const fn fails(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Serve a specific beacon for one round instead of the fixture.
    #[must_use]
    pub fn override_beacon(mut self, round: u64, beacon: Beacon) -> Self {
        self.overrides.insert(round, beacon);
        self
    }

    /// Attach a push capability driven by the given controller.
    #[must_use]
    pub fn with_push(mut self, push: MockPush) -> Self {
        self.push = Some(push);
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> MockEndpoint {
        MockEndpoint {
            state: Arc::new(SourceState {
                name: self.name,
                info: self.info,
                delay: self.delay,
                latest: AtomicU64::new(self.latest),
                fail: AtomicBool::new(self.fail),
                overrides: Mutex::new(self.overrides),
                fetches: AtomicUsize::new(0),
                info_calls: AtomicUsize::new(0),
                close_calls: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                push: self.push,
            }),
        }
    }
}

/// Scriptable implementation of the full `BeaconClient` capability interface.
///
/// Used to exercise decorating layers (cache, failover, metrics, aggregation)
/// in isolation: fetches serve deterministic fixtures and `watch` opens a
/// session on the embedded [`MockPush`] controller.
#[derive(Clone)]
pub struct MockClient {
    state: Arc<SourceState>,
}

impl MockClient {
    /// Start building a mock client.
    #[must_use]
    pub fn builder() -> MockClientBuilder {
        MockClientBuilder::new()
    }

    /// Number of `fetch` calls observed so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.state.fetches.load(Ordering::SeqCst)
    }

    /// Number of `close` calls observed so far.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    /// Flip forced-failure mode at runtime.
    pub fn set_fail(&self, fail: bool) {
        self.state.fail.store(fail, Ordering::SeqCst);
    }

    /// Move the most recently produced round forward (or backward).
    pub fn set_latest(&self, round: u64) {
        self.state.latest.store(round, Ordering::SeqCst);
    }

    /// The push controller feeding `watch` streams.
    #[must_use]
    pub fn push(&self) -> &MockPush {
        self.state.push.as_ref().expect("MockClient always has a push source")
    }
}

#[async_trait]
impl BeaconClient for MockClient {
    async fn fetch(&self, round: u64) -> Result<Beacon, FaroError> {
        self.state.fetch(round).await
    }

    async fn watch(&self) -> Result<BeaconStream, FaroError> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(FaroError::Cancelled);
        }
        self.push().watch().await
    }

    fn info(&self) -> &BeaconInfo {
        &self.state.info
    }

    async fn close(&self) -> Result<(), FaroError> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        self.state.closed.store(true, Ordering::SeqCst);
        self.push().end_sessions();
        Ok(())
    }
}

/// Builder for [`MockClient`].
pub struct MockClientBuilder {
    inner: MockEndpointBuilder,
}

impl Default for MockClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClientBuilder {
    /// Defaults match [`MockEndpointBuilder::new`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: MockEndpointBuilder::new().with_push(MockPush::new()),
        }
    }

    /// Chain identity reported by `info()`.
    #[must_use]
    pub fn info(mut self, info: BeaconInfo) -> Self {
        self.inner = self.inner.info(info);
        self
    }

    /// Artificial latency applied to every fetch.
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.inner = self.inner.delay(delay);
        self
    }

    /// Most recently produced round.
    #[must_use]
    pub fn latest(mut self, round: u64) -> Self {
        self.inner = self.inner.latest(round);
        self
    }

    /// Make every fetch fail until `set_fail(false)`.
    #[must_use]
    pub fn fails(mut self) -> Self {
        self.inner = self.inner.fails();
        self
    }

    /// Serve a specific beacon for one round instead of the fixture.
    #[must_use]
    pub fn override_beacon(mut self, round: u64, beacon: Beacon) -> Self {
        self.inner = self.inner.override_beacon(round, beacon);
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> MockClient {
        MockClient {
            state: self.inner.build().state,
        }
    }
}
