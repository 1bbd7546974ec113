use meter_telemetry::{metrics, new_request_ids, record_decode_failure};

#[test]
fn request_ids_non_empty() {
    let ids = new_request_ids();
    assert!(!ids.request_id.is_empty());
    assert!(!ids.trace_id.is_empty());
}

#[test]
fn counters_only_grow() {
    let before = metrics().snapshot().decode_failures;
    record_decode_failure();
    assert!(metrics().snapshot().decode_failures > before);
}
