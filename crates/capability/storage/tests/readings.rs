use domain::{Centi, Reading};
use meter_storage::{InMemoryReadingStore, ReadingStore, StoredReading};

fn sample_reading(meter_id: u32, timestamp: u32) -> Reading {
    Reading {
        timestamp,
        meter_id,
        voltage: Centi::from_raw(23050),
        current: Centi::from_raw(1050),
        power: Centi::from_raw(500_000),
        energy: Centi::from_raw(1_000_000),
    }
}

#[test]
fn stored_reading_uses_calendar_time() {
    let stored = StoredReading::from(&sample_reading(42, 1_700_000_000));
    assert_eq!(stored.recorded_at.to_rfc3339(), "2023-11-14T22:13:20+00:00");
    assert_eq!(stored.meter_id, 42);
    assert_eq!(stored.voltage.to_string(), "230.50");
    assert_eq!(stored.energy.to_string(), "10000.00");
}

#[tokio::test]
async fn in_memory_store_keeps_insert_order() {
    let store = InMemoryReadingStore::new();
    assert!(store.is_empty());

    for (meter_id, ts) in [(1, 100), (2, 100), (1, 101)] {
        store
            .insert_reading(&StoredReading::from(&sample_reading(meter_id, ts)))
            .await
            .expect("insert");
    }

    assert_eq!(store.len(), 3);
    let meter_one: Vec<i64> = store
        .for_meter(1)
        .iter()
        .map(|reading| reading.recorded_at.timestamp())
        .collect();
    assert_eq!(meter_one, vec![100, 101]);
    assert_eq!(store.all()[1].meter_id, 2);
}
