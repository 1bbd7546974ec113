use async_trait::async_trait;
use domain::{Centi, Reading, StreamRecord};
use meter_ingest::{ConnectionState, Framing, IngestConfig, IngestGateway};
use meter_log::{Ack, InMemoryLog, InMemoryLogConfig, LogError, LogPort, RecordHandler, Subscription};
use meter_protocol::encode;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

const TOPIC: &str = "meter-readings";

fn sample_reading(meter_id: u32) -> Reading {
    Reading {
        timestamp: 1_700_000_000,
        meter_id,
        voltage: Centi::from_raw(23050),
        current: Centi::from_raw(1050),
        power: Centi::from_raw(500_000),
        energy: Centi::from_raw(1_000_000),
    }
}

fn config(framing: Framing) -> IngestConfig {
    IngestConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        topic: TOPIC.to_string(),
        framing,
        ..IngestConfig::default()
    }
}

fn memory_log() -> Arc<InMemoryLog> {
    Arc::new(InMemoryLog::with_config(InMemoryLogConfig {
        partitions: 1,
        retention: 0,
    }))
}

/// 已发布读数，按 meterId 排序（不同 meter 之间不保证顺序）。
fn published_readings(log: &InMemoryLog) -> Vec<Reading> {
    let mut readings: Vec<Reading> = log
        .snapshot(TOPIC)
        .iter()
        .map(|record| Reading::from_payload(&record.payload).expect("payload"))
        .collect();
    readings.sort_by_key(|reading| reading.meter_id);
    readings
}

/// publish 永不完成，用于占满发布并发。
struct StalledLog;

#[async_trait]
impl LogPort for StalledLog {
    async fn publish(&self, _: &str, _: Option<&str>, _: Vec<u8>) -> Result<Ack, LogError> {
        std::future::pending().await
    }

    async fn subscribe(
        &self,
        _: &str,
        _: &str,
        _: Arc<dyn RecordHandler>,
    ) -> Result<Subscription, LogError> {
        Err(LogError::Subscribe("unsupported".to_string()))
    }
}

struct FailingLog {
    attempts: AtomicUsize,
}

#[async_trait]
impl LogPort for FailingLog {
    async fn publish(&self, _: &str, _: Option<&str>, _: Vec<u8>) -> Result<Ack, LogError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(LogError::Publish("broker down".to_string()))
    }

    async fn subscribe(
        &self,
        _: &str,
        _: &str,
        _: Arc<dyn RecordHandler>,
    ) -> Result<Subscription, LogError> {
        Err(LogError::Subscribe("unsupported".to_string()))
    }
}

#[tokio::test]
async fn malformed_chunk_keeps_connection_open() {
    let log = memory_log();
    let gateway = IngestGateway::new(log.clone(), config(Framing::Chunk));
    let reader = tokio_test::io::Builder::new()
        .read(&encode(&sample_reading(42)))
        .read(&[0xde, 0xad, 0xbe, 0xef, 0x00, 0x01, 0x02])
        .read(&encode(&sample_reading(7)))
        .build();

    let summary = gateway
        .handle_connection(reader, "meter-1".to_string())
        .await;
    gateway.drain().await;

    assert_eq!(summary.state, ConnectionState::Closed);
    assert_eq!(summary.packets, 3);
    assert_eq!(summary.decode_failures, 1);
    assert_eq!(summary.readings_dispatched, 2);

    let readings = published_readings(&log);
    assert_eq!(readings, vec![sample_reading(7), sample_reading(42)]);
    let mut keys: Vec<_> = log
        .snapshot(TOPIC)
        .into_iter()
        .filter_map(|record| record.key)
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["42".to_string(), "7".to_string()]);
}

#[tokio::test]
async fn fixed_framing_reassembles_split_packets() {
    let log = memory_log();
    let gateway = IngestGateway::new(log.clone(), config(Framing::Fixed));
    let first = encode(&sample_reading(1));
    let second = encode(&sample_reading(2));
    let mut tail = first[12..].to_vec();
    tail.extend_from_slice(&second);
    tail.extend_from_slice(&[1, 2, 3]);
    let reader = tokio_test::io::Builder::new()
        .read(&first[..12])
        .read(&tail)
        .build();

    let summary = gateway
        .handle_connection(reader, "meter-2".to_string())
        .await;
    gateway.drain().await;

    assert_eq!(summary.packets, 3);
    assert_eq!(summary.decode_failures, 1);
    assert_eq!(summary.readings_dispatched, 2);
    assert_eq!(
        published_readings(&log),
        vec![sample_reading(1), sample_reading(2)]
    );
}

#[tokio::test]
async fn publish_failure_does_not_close_connection() {
    let log = Arc::new(FailingLog {
        attempts: AtomicUsize::new(0),
    });
    let gateway = IngestGateway::new(log.clone(), config(Framing::Chunk));
    let reader = tokio_test::io::Builder::new()
        .read(&encode(&sample_reading(1)))
        .read(&encode(&sample_reading(2)))
        .build();

    let summary = gateway
        .handle_connection(reader, "meter-3".to_string())
        .await;
    gateway.drain().await;

    assert_eq!(summary.state, ConnectionState::Closed);
    assert_eq!(summary.readings_dispatched, 2);
    assert_eq!(log.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn saturated_publishes_drop_readings() {
    let gateway = IngestGateway::new(
        Arc::new(StalledLog),
        IngestConfig {
            max_inflight_publishes: 1,
            ..config(Framing::Chunk)
        },
    );
    let reader = tokio_test::io::Builder::new()
        .read(&encode(&sample_reading(1)))
        .read(&encode(&sample_reading(2)))
        .build();

    let summary = gateway
        .handle_connection(reader, "meter-4".to_string())
        .await;

    assert_eq!(summary.readings_dispatched, 1);
    assert_eq!(summary.readings_dropped, 1);
}

struct ForwardingHandler {
    tx: mpsc::UnboundedSender<StreamRecord>,
}

#[async_trait]
impl RecordHandler for ForwardingHandler {
    async fn handle(&self, record: StreamRecord) -> Result<(), LogError> {
        let _ = self.tx.send(record);
        Ok(())
    }
}

#[tokio::test]
async fn loopback_connection_publishes_readings() {
    let log = memory_log();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = log
        .subscribe(TOPIC, "test-group", Arc::new(ForwardingHandler { tx }))
        .await
        .expect("subscribe");

    let gateway = IngestGateway::new(log.clone(), config(Framing::Chunk));
    let listener = gateway.bind().await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let server = {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.serve(listener).await })
    };

    let mut meter = TcpStream::connect(addr).await.expect("connect");
    meter.set_nodelay(true).expect("nodelay");
    meter.write_all(&[0x01, 0x02, 0x03]).await.expect("write");
    tokio::time::sleep(Duration::from_millis(50)).await;
    meter
        .write_all(&encode(&sample_reading(42)))
        .await
        .expect("write");

    let record = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timeout")
        .expect("record");
    let reading = Reading::from_payload(&record.payload).expect("payload");
    assert_eq!(reading, sample_reading(42));
    assert_eq!(record.key.as_deref(), Some("42"));

    gateway.close();
    drop(meter);
    let result = tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .expect("timeout")
        .expect("join");
    assert!(result.is_ok());
}
