use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use faro_core::{
    Beacon, BeaconClient, BeaconInfo, BeaconStream, BeaconVerifier, Endpoint, FaroError,
    LATEST_ROUND, RandomnessVerifier, Watcher,
};
use faro_http::HttpEndpoint;
use faro_middleware::{CachingClient, FailoverWatcher, LatencyClient, RoundCache};

use crate::aggregator::WatchAggregator;
use crate::prioritize::{PrioritizingClient, RaceConfig};

/// Default bound on the local beacon cache.
pub const DEFAULT_CACHE_SIZE: usize = 32;

/// Constructor for a custom push watcher, invoked once the chain identity is
/// resolved. Receives the shared round cache so a watcher implementation can
/// keep it warm itself if it wants to.
pub type WatcherCtor =
    Box<dyn FnOnce(&BeaconInfo, Arc<RoundCache>) -> Result<Arc<dyn Watcher>, FaroError> + Send>;

/// Substitutes the watch path of a client with a custom push watcher while
/// keeping its fetch path.
struct WatcherClient {
    inner: Arc<dyn BeaconClient>,
    watcher: Arc<dyn Watcher>,
}

#[async_trait]
impl BeaconClient for WatcherClient {
    async fn fetch(&self, round: u64) -> Result<Beacon, FaroError> {
        self.inner.fetch(round).await
    }

    async fn watch(&self) -> Result<BeaconStream, FaroError> {
        self.watcher.watch().await
    }

    fn info(&self) -> &BeaconInfo {
        self.inner.info()
    }

    async fn close(&self) -> Result<(), FaroError> {
        self.inner.close().await
    }
}

/// The assembled beacon client.
///
/// Construction-time composition, bottom to top: endpoints, the prioritizing
/// racer, an optional custom watcher, the cache, the failover watcher, the
/// watch aggregator, and optionally the latency observer. The ordering is a
/// contract: failover wraps above caching so substituted values are cached,
/// and the aggregator sits above failover so every subscriber gets the same
/// safety net.
#[derive(Clone)]
pub struct Faro {
    inner: Arc<dyn BeaconClient>,
}

impl std::fmt::Debug for Faro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Faro").finish_non_exhaustive()
    }
}

impl Faro {
    /// Start building a client.
    ///
    /// Typical usage:
    ///
    /// ```rust,ignore
    /// let client = Faro::builder()
    ///     .http_endpoints(&["https://api.drand.sh", "https://drand.cloudflare.com"])
    ///     .chain_hash(hex::decode("8990e7a9...")?)
    ///     .failover_grace_period(Duration::from_secs(5))
    ///     .build()
    ///     .await?;
    ///
    /// let beacon = client.latest().await?;
    /// ```
    #[must_use]
    pub fn builder() -> FaroBuilder {
        FaroBuilder::new()
    }

    /// Fetch the beacon for `round`; 0 means the most recent round.
    ///
    /// # Errors
    /// Surfaces the wrapped layers' failures, aggregated across endpoints.
    pub async fn fetch(&self, round: u64) -> Result<Beacon, FaroError> {
        self.inner.fetch(round).await
    }

    /// Fetch the most recently produced beacon.
    ///
    /// # Errors
    /// Same failure modes as [`fetch`](Self::fetch).
    pub async fn latest(&self) -> Result<Beacon, FaroError> {
        self.inner.fetch(LATEST_ROUND).await
    }

    /// Open a stream of new beacons; see [`BeaconClient::watch`].
    ///
    /// # Errors
    /// Fails with [`FaroError::Cancelled`] once the client is closed.
    pub async fn watch(&self) -> Result<BeaconStream, FaroError> {
        self.inner.watch().await
    }

    /// The chain identity this client trusts.
    #[must_use]
    pub fn info(&self) -> &BeaconInfo {
        self.inner.info()
    }

    /// The round in effect at `time`. Pure arithmetic, no I/O.
    #[must_use]
    pub fn round_at(&self, time: DateTime<Utc>) -> u64 {
        self.inner.info().round_at(time)
    }

    /// Release every resource: endpoints, the upstream subscription, and all
    /// open streams. Idempotent and safe to call concurrently with in-flight
    /// operations, which fail with [`FaroError::Cancelled`].
    ///
    /// # Errors
    /// Returns the first endpoint release failure, after attempting all.
    pub async fn close(&self) -> Result<(), FaroError> {
        self.inner.close().await
    }
}

#[async_trait]
impl BeaconClient for Faro {
    async fn fetch(&self, round: u64) -> Result<Beacon, FaroError> {
        self.inner.fetch(round).await
    }

    async fn watch(&self) -> Result<BeaconStream, FaroError> {
        self.inner.watch().await
    }

    fn info(&self) -> &BeaconInfo {
        self.inner.info()
    }

    async fn close(&self) -> Result<(), FaroError> {
        self.inner.close().await
    }
}

/// Builder for a [`Faro`] client.
///
/// All validation happens in [`build`](Self::build) before any endpoint is
/// constructed or any network call is made; an invalid combination is a
/// [`FaroError::Config`] and nothing else runs.
pub struct FaroBuilder {
    urls: Vec<String>,
    insecure_urls: Vec<String>,
    endpoints: Vec<Arc<dyn Endpoint>>,
    chain_hash: Option<Vec<u8>>,
    chain_info: Option<BeaconInfo>,
    transport: Option<reqwest::Client>,
    cache_size: usize,
    failover_grace: Duration,
    watcher: Option<WatcherCtor>,
    auto_watch: bool,
    latency_metrics: bool,
    verifier: Option<Arc<dyn BeaconVerifier>>,
    race: RaceConfig,
}

impl Default for FaroBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FaroBuilder {
    /// Create a builder with defaults: 32-entry cache, failover disabled,
    /// no auto-watch, no metrics, 5s endpoint timeout, 500ms fan-out stagger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            urls: Vec::new(),
            insecure_urls: Vec::new(),
            endpoints: Vec::new(),
            chain_hash: None,
            chain_info: None,
            transport: None,
            cache_size: DEFAULT_CACHE_SIZE,
            failover_grace: Duration::ZERO,
            watcher: None,
            auto_watch: false,
            latency_metrics: false,
            verifier: None,
            race: RaceConfig::default(),
        }
    }

    /// Add HTTP endpoints whose responses are validated against the
    /// configured root of trust.
    ///
    /// Behavior and trade-offs:
    /// - Registration order is the initial preference order; health
    ///   observations reorder it adaptively afterwards.
    /// - Cannot be combined with [`insecure_http_endpoints`](Self::insecure_http_endpoints)
    ///   in one client.
    #[must_use]
    pub fn http_endpoints(mut self, urls: &[&str]) -> Self {
        self.urls.extend(urls.iter().map(ToString::to_string));
        self
    }

    /// Add HTTP endpoints without any root of trust.
    ///
    /// Behavior and trade-offs:
    /// - The chain identity is taken from the first endpoint that answers,
    ///   unverified. Only suitable when the transport is already trusted.
    /// - Cannot be combined with secure endpoints in one client.
    #[must_use]
    pub fn insecure_http_endpoints(mut self, urls: &[&str]) -> Self {
        self.insecure_urls
            .extend(urls.iter().map(ToString::to_string));
        self
    }

    /// Register a pre-built endpoint (a custom transport, or a mock in
    /// tests). Participates in racing and health tracking like any other.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Arc<dyn Endpoint>) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Root trust in a chain hash; the full identity is fetched from the
    /// endpoints and checked against it.
    #[must_use]
    pub fn chain_hash(mut self, hash: Vec<u8>) -> Self {
        self.chain_hash = Some(hash);
        self
    }

    /// Root trust in a full chain identity; no identity fetch is needed.
    #[must_use]
    pub fn chain_info(mut self, info: BeaconInfo) -> Self {
        self.chain_info = Some(info);
        self
    }

    /// Share a preconfigured HTTP client (proxies, TLS settings, timeouts)
    /// across every URL-built endpoint.
    #[must_use]
    pub fn transport(mut self, client: reqwest::Client) -> Self {
        self.transport = Some(client);
        self
    }

    /// Bound on the local beacon cache; 0 disables local storage entirely
    /// (request coalescing still applies). Default 32.
    #[must_use]
    pub const fn cache_size(mut self, entries: usize) -> Self {
        self.cache_size = entries;
        self
    }

    /// Enable push-to-poll failover: when no beacon has arrived this long
    /// past the next round's expected time, the watcher substitutes an
    /// explicit fetch. Zero (the default) disables the layer.
    ///
    /// Behavior and trade-offs:
    /// - A short grace period fills gaps quickly but risks duplicate load
    ///   when the beacon is merely jittery; one period is a sane floor.
    #[must_use]
    pub const fn failover_grace_period(mut self, grace: Duration) -> Self {
        self.failover_grace = grace;
        self
    }

    /// Substitute the push subscription with a custom watcher, constructed
    /// once the chain identity is resolved. The watcher receives the shared
    /// round cache.
    #[must_use]
    pub fn with_watcher<F>(mut self, ctor: F) -> Self
    where
        F: FnOnce(&BeaconInfo, Arc<RoundCache>) -> Result<Arc<dyn Watcher>, FaroError>
            + Send
            + 'static,
    {
        self.watcher = Some(Box::new(ctor));
        self
    }

    /// Keep a background subscription open even with zero watchers, so new
    /// rounds land in the cache before anyone asks for them.
    #[must_use]
    pub const fn auto_watch(mut self) -> Self {
        self.auto_watch = true;
        self
    }

    /// Record delivery-latency histograms through the `metrics` facade.
    ///
    /// Requires an identity that can be pinned before any network call (a
    /// chain hash or full chain info); otherwise construction fails.
    #[must_use]
    pub const fn latency_metrics(mut self) -> Self {
        self.latency_metrics = true;
        self
    }

    /// Override beacon verification (e.g. plug in full signature checks).
    #[must_use]
    pub fn verifier(mut self, verifier: Arc<dyn BeaconVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Bound applied to each individual endpoint call during racing.
    #[must_use]
    pub const fn endpoint_timeout(mut self, timeout: Duration) -> Self {
        self.race.endpoint_timeout = timeout;
        self
    }

    /// Head start the preferred endpoint gets before the next one joins the
    /// race. Zero fans out to every endpoint at once.
    #[must_use]
    pub const fn fan_out_stagger(mut self, stagger: Duration) -> Self {
        self.race.fan_out_stagger = stagger;
        self
    }

    fn validate(&self) -> Result<(), FaroError> {
        if self.urls.is_empty() && self.insecure_urls.is_empty() && self.endpoints.is_empty() {
            return Err(FaroError::config(
                "no endpoints configured; add at least one via http_endpoints(...) or with_endpoint(...)",
            ));
        }
        if !self.urls.is_empty() && !self.insecure_urls.is_empty() {
            return Err(FaroError::config(
                "cannot mix secure and insecure endpoints in one client",
            ));
        }
        let insecure = !self.insecure_urls.is_empty();
        if !insecure && self.chain_hash.is_none() && self.chain_info.is_none() {
            return Err(FaroError::config(
                "no root of trust; provide a chain hash, full chain info, or opt into insecure endpoints",
            ));
        }
        if let (Some(hash), Some(info)) = (&self.chain_hash, &self.chain_info)
            && *hash != info.hash
        {
            return Err(FaroError::config(
                "chain hash does not match the supplied chain info",
            ));
        }
        if self.latency_metrics && self.chain_hash.is_none() && self.chain_info.is_none() {
            return Err(FaroError::config(
                "latency metrics require a known chain identity",
            ));
        }
        Ok(())
    }

    /// Resolve the chain identity: an explicit one wins, otherwise the
    /// endpoints are asked in order and (when a hash is pinned) checked
    /// against it. A mismatching endpoint counts as failed and the next one
    /// is tried.
    async fn resolve_info(&self, endpoints: &[Arc<dyn Endpoint>]) -> Result<BeaconInfo, FaroError> {
        if let Some(info) = &self.chain_info {
            return Ok(info.clone());
        }
        let mut errors = Vec::new();
        for endpoint in endpoints {
            match endpoint.chain_info().await {
                Ok(info) => {
                    if let Some(hash) = &self.chain_hash
                        && info.hash != *hash
                    {
                        errors.push(FaroError::invalid_beacon(
                            endpoint.name(),
                            "chain info does not match the trusted chain hash",
                        ));
                        continue;
                    }
                    return Ok(info);
                }
                Err(e) => errors.push(e),
            }
        }
        Err(FaroError::AllEndpointsFailed(errors))
    }

    /// Validate the configuration and assemble the client.
    ///
    /// # Errors
    /// `Config` for an invalid option combination (checked before any network
    /// activity); endpoint failures when the chain identity has to be fetched
    /// and no endpoint can provide one.
    pub async fn build(mut self) -> Result<Faro, FaroError> {
        self.validate()?;

        let mut endpoints = std::mem::take(&mut self.endpoints);
        let transport = self.transport.take().unwrap_or_default();
        for url in self.urls.iter().chain(self.insecure_urls.iter()) {
            endpoints.push(Arc::new(HttpEndpoint::with_client(url, transport.clone())?));
        }

        let info = self.resolve_info(&endpoints).await?;
        let verifier = self
            .verifier
            .take()
            .unwrap_or_else(|| Arc::new(RandomnessVerifier));

        let mut client: Arc<dyn BeaconClient> = Arc::new(PrioritizingClient::new(
            endpoints,
            info.clone(),
            verifier,
            self.race,
        ));

        let cache = Arc::new(RoundCache::new(self.cache_size));
        if let Some(ctor) = self.watcher.take() {
            let watcher = ctor(&info, Arc::clone(&cache))?;
            client = Arc::new(WatcherClient {
                inner: client,
                watcher,
            });
        }
        if self.cache_size > 0 {
            client = Arc::new(CachingClient::new(client, cache));
        }
        if !self.failover_grace.is_zero() {
            client = Arc::new(FailoverWatcher::new(
                client,
                info.clone(),
                self.failover_grace,
            ));
        }

        let aggregator = WatchAggregator::new(client, self.auto_watch);
        if self.auto_watch {
            aggregator.ensure_upstream();
        }
        client = Arc::new(aggregator);

        if self.latency_metrics {
            client = Arc::new(LatencyClient::new(client, info));
        }

        Ok(Faro { inner: client })
    }
}
