//! Beacon data structures and round arithmetic.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Caller-facing sentinel meaning "the most recently produced round".
///
/// Never a valid beacon round and never a stable cache key; resolution to a
/// concrete round happens at the endpoint boundary.
pub const LATEST_ROUND: u64 = 0;

/// Hex (de)serialization for byte fields, matching the beacon wire format.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(d)?;
        hex::decode(&raw).map_err(D::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer, de::Error};

        pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(b) => s.serialize_some(&hex::encode(b)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
            let raw = Option::<String>::deserialize(d)?;
            raw.map(|r| hex::decode(&r).map_err(D::Error::custom))
                .transpose()
        }
    }
}

/// One output of the randomness beacon.
///
/// Immutable; once observed valid for a chain identity it is permanently
/// valid. Byte fields travel hex-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
    /// Sequence number of this output; always >= 1 for a real beacon.
    pub round: u64,
    /// The randomness payload, derived from the signature.
    #[serde(with = "hex_bytes")]
    pub randomness: Vec<u8>,
    /// Signature material binding the payload to the round.
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
    /// Signature of the previous round, when the scheme chains them.
    #[serde(
        with = "hex_bytes::option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub previous_signature: Option<Vec<u8>>,
}

/// Immutable descriptor of one beacon chain: the root of trust for every
/// value fetched from it and the schedule used to reason about round timing.
///
/// Established once at client construction and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconInfo {
    /// Distributed public key of the beacon group.
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    /// Seconds between consecutive rounds.
    #[serde(rename = "period")]
    pub period_seconds: u64,
    /// Unix time (seconds) at which round 1 was produced.
    pub genesis_time: i64,
    /// Content hash uniquely identifying this chain.
    #[serde(with = "hex_bytes")]
    pub hash: Vec<u8>,
    /// Identifier of the cryptographic scheme, when advertised.
    #[serde(rename = "schemeID", default, skip_serializing_if = "Option::is_none")]
    pub scheme_id: Option<String>,
}

impl BeaconInfo {
    /// The fixed time between rounds.
    #[must_use]
    pub const fn period(&self) -> Duration {
        Duration::from_secs(self.period_seconds)
    }

    /// The round in effect at `time`.
    ///
    /// Rounds start at 1 at genesis; a time before genesis maps to round 1,
    /// the first round that will ever exist. Pure arithmetic, no I/O.
    #[must_use]
    pub fn round_at(&self, time: DateTime<Utc>) -> u64 {
        let elapsed = time.timestamp() - self.genesis_time;
        if elapsed < 0 || self.period_seconds == 0 {
            return 1;
        }
        (elapsed as u64 / self.period_seconds) + 1
    }

    /// The expected production time of `round`.
    ///
    /// Round 0 is the "latest" sentinel and has no schedule slot; it is
    /// treated as round 1 here so callers never observe a pre-genesis time.
    #[must_use]
    pub fn time_of_round(&self, round: u64) -> DateTime<Utc> {
        let offset = round.max(1) - 1;
        let secs = self.genesis_time + (offset * self.period_seconds) as i64;
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default()
    }
}
