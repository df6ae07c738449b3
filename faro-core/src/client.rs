use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::stream::StreamHandle;
use crate::types::{Beacon, BeaconInfo};
use crate::FaroError;

/// A live stream of beacons: a handle that stops the producing task and the
/// bounded channel the values arrive on.
pub type BeaconStream = (StreamHandle, mpsc::Receiver<Beacon>);

/// The capability interface shared by every layer of an assembled client.
///
/// Decorating layers (caching, failover, aggregation, metrics) all implement
/// this trait over an inner `Arc<dyn BeaconClient>`, so composition is plain
/// construction-time wrapping rather than runtime type inspection.
#[async_trait]
pub trait BeaconClient: Send + Sync {
    /// Fetch the beacon for `round`; [`crate::LATEST_ROUND`] (0) means the
    /// most recently produced round.
    ///
    /// Blocks the caller until a beacon, an error, or cancellation. Dropping
    /// the returned future abandons the call; closing the client fails it
    /// with [`FaroError::Cancelled`].
    async fn fetch(&self, round: u64) -> Result<Beacon, FaroError>;

    /// Open a stream of new beacons as they are produced.
    ///
    /// Returns immediately; the stream is populated asynchronously and never
    /// replays values produced before it was opened. The stream closes when
    /// the handle is stopped/dropped or the client is closed.
    async fn watch(&self) -> Result<BeaconStream, FaroError>;

    /// The chain identity this client is bound to.
    fn info(&self) -> &BeaconInfo;

    /// Release all resources held by this client and the layers below it.
    ///
    /// Safe to call concurrently with in-flight operations and idempotent.
    /// Blocked fetches fail with [`FaroError::Cancelled`] and open streams
    /// close.
    async fn close(&self) -> Result<(), FaroError>;
}

/// A push-style subscription source.
///
/// Implemented by endpoints with native streaming and by custom watcher
/// constructions supplied through configuration.
#[async_trait]
pub trait Watcher: Send + Sync {
    /// Open a push subscription delivering each new beacon once.
    async fn watch(&self) -> Result<BeaconStream, FaroError>;
}

/// One connection to one remote beacon source.
///
/// This is the collaborator boundary of the composition layer: the wire
/// protocol behind it is not faro's concern. Implementations must be safe to
/// share across tasks; the endpoint list of an assembled client is immutable
/// after construction.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Stable name for this endpoint, used in errors and logs (usually the
    /// URL it was constructed from).
    fn name(&self) -> &str;

    /// Fetch the beacon for `round` (0 = latest) from this source only.
    async fn fetch(&self, round: u64) -> Result<Beacon, FaroError>;

    /// Fetch the chain identity this source claims to serve.
    async fn chain_info(&self) -> Result<BeaconInfo, FaroError>;

    /// Native push capability, when the transport supports one.
    fn as_watcher(&self) -> Option<&dyn Watcher> {
        None
    }

    /// Release connection resources. Default: nothing to release.
    async fn close(&self) -> Result<(), FaroError> {
        Ok(())
    }
}
