use domain::{Centi, ClientId, Reading};

fn sample_reading() -> Reading {
    Reading {
        timestamp: 1_700_000_000,
        meter_id: 42,
        voltage: Centi::from_raw(23050),
        current: Centi::from_raw(1050),
        power: Centi::from_raw(500_000),
        energy: Centi::from_raw(1_000_000),
    }
}

#[test]
fn reading_payload_is_camel_case_json() {
    let payload = sample_reading().to_payload().expect("payload");
    let value: serde_json::Value = serde_json::from_slice(&payload).expect("json");
    assert_eq!(value["meterId"], 42);
    assert_eq!(value["timestamp"], 1_700_000_000u32);
    assert_eq!(value["voltage"], "230.50");
    assert_eq!(value["energy"], "10000.00");
}

#[test]
fn reading_payload_decodes_back() {
    let reading = sample_reading();
    let payload = reading.to_payload().expect("payload");
    assert_eq!(Reading::from_payload(&payload).expect("decode"), reading);
}

#[test]
fn reading_payload_rejects_garbage() {
    let err = Reading::from_payload(b"not json").expect_err("garbage");
    assert!(err.to_string().starts_with("reading payload error"));
}

#[test]
fn client_ids_are_unique() {
    assert_ne!(ClientId::new(), ClientId::new());
}
