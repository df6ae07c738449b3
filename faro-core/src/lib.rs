//! faro-core
//!
//! Core types, traits, and utilities shared across the faro ecosystem.
//!
//! - `types`: beacon data structures (`BeaconInfo`, `Beacon`) and round math.
//! - `client`: the `BeaconClient` capability trait and the `Endpoint`
//!   collaborator boundary.
//! - `verify`: the pluggable beacon verification boundary.
//!
//! Async runtime (Tokio)
//! ---------------------
//! This crate assumes the Tokio ecosystem as the async runtime. Several public
//! APIs are explicitly coupled to Tokio types and facilities:
//!
//! - `stream::StreamHandle` wraps `tokio::task::JoinHandle<()>` and uses
//!   `tokio::sync::oneshot::Sender<()>` for cooperative shutdown.
//! - `BeaconClient::watch` and `Watcher::watch` return
//!   `(StreamHandle, tokio::sync::mpsc::Receiver<Beacon>)`.
//!
//! As a result, code that uses streaming must run under a Tokio 1.x runtime.
//!
#![warn(missing_docs)]

/// The `BeaconClient` capability trait and the `Endpoint`/`Watcher` boundaries.
pub mod client;
/// Internal stream utilities used by `StreamHandle` and tests.
pub mod stream;
pub mod types;
/// Beacon verification boundary and the default verifiers.
pub mod verify;

pub use client::{BeaconClient, BeaconStream, Endpoint, Watcher};
pub use stream::StreamHandle;
pub use types::{Beacon, BeaconInfo, LATEST_ROUND};
pub use verify::{BeaconVerifier, InsecureVerifier, RandomnessVerifier};

use thiserror::Error;

/// Unified error type for the faro workspace.
///
/// The enum mirrors the failure taxonomy of a multi-endpoint client:
/// construction-time configuration problems, per-endpoint transport and
/// validation failures absorbed by racing, the aggregate produced when every
/// endpoint has been tried, and the cancellation class raised by client
/// closure. It is `Clone` so a single coalesced fetch outcome can be handed
/// to every waiting caller.
#[derive(Debug, Clone, Error)]
pub enum FaroError {
    /// Invalid option combination, rejected at construction before any I/O.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A single endpoint failed at the network level.
    #[error("{endpoint} failed: {msg}")]
    Endpoint {
        /// Endpoint name (usually its URL) that failed.
        endpoint: String,
        /// Human-readable error message.
        msg: String,
    },

    /// A single endpoint call exceeded the configured timeout.
    #[error("endpoint timed out: {endpoint}")]
    EndpointTimeout {
        /// Endpoint name that timed out.
        endpoint: String,
    },

    /// An endpoint returned a beacon that does not verify against the
    /// expected chain identity.
    #[error("{endpoint} returned an invalid beacon: {reason}")]
    InvalidBeacon {
        /// Endpoint name whose response failed verification.
        endpoint: String,
        /// Why verification rejected the beacon.
        reason: String,
    },

    /// Every endpoint failed or failed validation; contains the individual
    /// failures in the order they were observed.
    #[error("all endpoints failed: {0:?}")]
    AllEndpointsFailed(Vec<FaroError>),

    /// The caller's cancellation fired or the client was closed.
    #[error("cancelled: client is closed")]
    Cancelled,

    /// Issues with returned or expected data (bad encoding, missing fields).
    #[error("data issue: {0}")]
    Data(String),

    /// Unknown/opaque error.
    #[error("unknown error: {0}")]
    Other(String),
}

impl FaroError {
    /// Helper: build a `Config` error from a message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Helper: build an `Endpoint` error with the endpoint name and message.
    pub fn endpoint(endpoint: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Endpoint {
            endpoint: endpoint.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build an `EndpointTimeout` error.
    pub fn endpoint_timeout(endpoint: impl Into<String>) -> Self {
        Self::EndpointTimeout {
            endpoint: endpoint.into(),
        }
    }

    /// Helper: build an `InvalidBeacon` error.
    pub fn invalid_beacon(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidBeacon {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// `true` when the error belongs to the cancellation class.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
