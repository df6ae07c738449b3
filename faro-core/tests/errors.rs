use faro_core::FaroError;

#[test]
fn endpoint_errors_carry_their_source() {
    let e = FaroError::endpoint("https://a.example", "connection refused");
    match e {
        FaroError::Endpoint { endpoint, msg } => {
            assert_eq!(endpoint, "https://a.example");
            assert_eq!(msg, "connection refused");
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn aggregate_preserves_individual_failures_in_order() {
    let errs = vec![
        FaroError::endpoint_timeout("https://a.example"),
        FaroError::invalid_beacon("https://b.example", "bad digest"),
    ];
    let agg = FaroError::AllEndpointsFailed(errs);
    match agg {
        FaroError::AllEndpointsFailed(inner) => {
            assert_eq!(inner.len(), 2);
            assert!(matches!(inner[0], FaroError::EndpointTimeout { .. }));
            assert!(matches!(inner[1], FaroError::InvalidBeacon { .. }));
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn cancellation_class_is_distinguishable() {
    assert!(FaroError::Cancelled.is_cancelled());
    assert!(!FaroError::config("nope").is_cancelled());
    assert!(!FaroError::endpoint("x", "y").is_cancelled());
}

#[test]
fn errors_are_cloneable_for_coalesced_outcomes() {
    let e = FaroError::AllEndpointsFailed(vec![FaroError::endpoint("a", "b")]);
    let copy = e.clone();
    assert_eq!(format!("{e}"), format!("{copy}"));
}
