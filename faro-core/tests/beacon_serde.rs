use faro_core::{Beacon, BeaconInfo};

// Wire fixtures follow the JSON shape served by public beacon endpoints:
// hex-encoded byte fields, `period` in seconds, `genesis_time` in unix
// seconds.

#[test]
fn beacon_decodes_from_wire_json() {
    let raw = r#"{
        "round": 367,
        "randomness": "3439d92d58e47d342131d446a3abe264396dd264717897af30525c98408c834f",
        "signature": "842b",
        "previous_signature": "1ce1"
    }"#;
    let b: Beacon = serde_json::from_str(raw).unwrap();
    assert_eq!(b.round, 367);
    assert_eq!(b.randomness.len(), 32);
    assert_eq!(b.signature, vec![0x84, 0x2b]);
    assert_eq!(b.previous_signature, Some(vec![0x1c, 0xe1]));
}

#[test]
fn beacon_previous_signature_is_optional() {
    let raw = r#"{"round": 1, "randomness": "00", "signature": "ff"}"#;
    let b: Beacon = serde_json::from_str(raw).unwrap();
    assert_eq!(b.previous_signature, None);

    let encoded = serde_json::to_string(&b).unwrap();
    assert!(!encoded.contains("previous_signature"));
}

#[test]
fn beacon_roundtrips_through_json() {
    let b = Beacon {
        round: 999,
        randomness: vec![0x11; 32],
        signature: vec![0x22; 48],
        previous_signature: Some(vec![0x33; 48]),
    };
    let back: Beacon = serde_json::from_str(&serde_json::to_string(&b).unwrap()).unwrap();
    assert_eq!(back, b);
}

#[test]
fn info_decodes_from_wire_json() {
    let raw = r#"{
        "public_key": "868f005eb8e6e4ca0a47c8a77ceaa5309a47978a7c71bc5cce96366b5d7a569937c529eeda66c7293784a9402801af31",
        "period": 30,
        "genesis_time": 1595431050,
        "hash": "8990e7a9aaed2ffed73dbd7092123d6f289930540d7651336225dc172e51b2ce",
        "schemeID": "pedersen-bls-chained"
    }"#;
    let info: BeaconInfo = serde_json::from_str(raw).unwrap();
    assert_eq!(info.period_seconds, 30);
    assert_eq!(info.genesis_time, 1_595_431_050);
    assert_eq!(info.public_key.len(), 48);
    assert_eq!(info.hash.len(), 32);
    assert_eq!(info.scheme_id.as_deref(), Some("pedersen-bls-chained"));
}

#[test]
fn rejects_non_hex_payload() {
    let raw = r#"{"round": 1, "randomness": "zz", "signature": "ff"}"#;
    assert!(serde_json::from_str::<Beacon>(raw).is_err());
}
