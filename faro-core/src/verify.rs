use sha2::{Digest, Sha256};

use crate::types::{Beacon, BeaconInfo};
use crate::FaroError;

/// Decides whether a beacon is acceptable for a given chain identity.
///
/// Full signature verification is deliberately a collaborator: schemes vary
/// per chain and need key material this crate does not interpret. Racing
/// layers treat any verification failure as a failure of the endpoint that
/// produced the beacon, never as a terminal error for the whole call.
pub trait BeaconVerifier: Send + Sync {
    /// Return `Ok(())` when `beacon` is acceptable for `info`.
    fn verify(&self, info: &BeaconInfo, beacon: &Beacon) -> Result<(), FaroError>;
}

/// Default verifier: checks everything checkable without key material.
///
/// A real beacon has a non-zero round, a non-empty signature, and a
/// randomness payload equal to the SHA-256 digest of its signature. Chains
/// whose scheme derives randomness differently should supply their own
/// verifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomnessVerifier;

impl BeaconVerifier for RandomnessVerifier {
    fn verify(&self, _info: &BeaconInfo, beacon: &Beacon) -> Result<(), FaroError> {
        if beacon.round == 0 {
            return Err(FaroError::Data("beacon carries the round-0 sentinel".into()));
        }
        if beacon.signature.is_empty() {
            return Err(FaroError::Data("beacon has an empty signature".into()));
        }
        let digest = Sha256::digest(&beacon.signature);
        if digest.as_slice() != beacon.randomness.as_slice() {
            return Err(FaroError::Data(
                "randomness does not match the signature digest".into(),
            ));
        }
        Ok(())
    }
}

/// Verifier that only rejects structurally impossible beacons.
///
/// Suitable for explicitly insecure configurations and tests; accepts any
/// payload as long as a round number is present.
#[derive(Debug, Default, Clone, Copy)]
pub struct InsecureVerifier;

impl BeaconVerifier for InsecureVerifier {
    fn verify(&self, _info: &BeaconInfo, beacon: &Beacon) -> Result<(), FaroError> {
        if beacon.round == 0 {
            return Err(FaroError::Data("beacon carries the round-0 sentinel".into()));
        }
        Ok(())
    }
}
