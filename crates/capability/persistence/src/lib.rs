//! # 持久化消费者
//!
//! 作为日志消费组订阅读数流，解码后写入 [`meter_storage::ReadingStore`]。
//!
//! 投递是至少一次的：近期已写入的 `(meterId, timestamp)` 会被缓存，
//! 完全相同的重复投递直接跳过。缓存有界，不提供精确一次保证。

use async_trait::async_trait;
use domain::{PayloadError, Reading, StreamRecord};
use meter_log::{LogError, RecordHandler};
use meter_storage::{ReadingStore, StorageError, StoredReading};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// 持久化错误。
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("payload error: {0}")]
    Payload(#[from] PayloadError),
    #[error("store error: {0}")]
    Store(#[from] StorageError),
}

/// 持久化参数。
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// 去重缓存容量，0 表示关闭
    pub dedup_cache_size: usize,
    /// 写入失败后的立即重试次数
    pub max_retries: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            dedup_cache_size: 10_000,
            max_retries: 0,
        }
    }
}

/// 单条读数的处理结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Stored,
    Duplicate,
}

type DedupKey = (u32, u32);

/// 近期写入缓存：按插入顺序淘汰，同 key 重复写入时旧的顺序记录作废。
struct DedupState {
    map: HashMap<DedupKey, (Reading, u64)>,
    order: VecDeque<(DedupKey, u64)>,
    counter: u64,
    capacity: usize,
}

impl DedupState {
    fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            counter: 0,
            capacity,
        }
    }

    fn seen(&self, key: &DedupKey, reading: &Reading) -> bool {
        self.map
            .get(key)
            .map(|(existing, _)| existing == reading)
            .unwrap_or(false)
    }

    fn remember(&mut self, key: DedupKey, reading: Reading) {
        if self.capacity == 0 {
            return;
        }
        self.counter = self.counter.saturating_add(1);
        let token = self.counter;
        self.map.insert(key, (reading, token));
        self.order.push_back((key, token));
        while self.map.len() > self.capacity {
            let Some((evict_key, evict_token)) = self.order.pop_front() else {
                break;
            };
            let current = self
                .map
                .get(&evict_key)
                .map(|(_, token)| *token == evict_token)
                .unwrap_or(false);
            if current {
                self.map.remove(&evict_key);
            }
        }
    }
}

/// 持久化消费者。
pub struct PersistenceSink {
    store: Arc<dyn ReadingStore>,
    config: PersistenceConfig,
    dedup: Mutex<DedupState>,
}

impl PersistenceSink {
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self::with_config(store, PersistenceConfig::default())
    }

    pub fn with_config(store: Arc<dyn ReadingStore>, config: PersistenceConfig) -> Self {
        let dedup = Mutex::new(DedupState::new(config.dedup_cache_size));
        Self {
            store,
            config,
            dedup,
        }
    }

    /// 写入一条读数；与近期已写入的完全相同时跳过。
    pub async fn persist(&self, reading: &Reading) -> Result<PersistOutcome, PersistenceError> {
        let key = (reading.meter_id, reading.timestamp);
        if self.dedup.lock().await.seen(&key, reading) {
            meter_telemetry::record_duplicate_skipped();
            debug!(
                target: "meter.persist",
                meter_id = reading.meter_id,
                timestamp = reading.timestamp,
                "duplicate_reading_skipped"
            );
            return Ok(PersistOutcome::Duplicate);
        }

        let stored = StoredReading::from(reading);
        if let Err(err) = self.insert_with_retry(&stored).await {
            meter_telemetry::record_persist_failure();
            return Err(err.into());
        }
        // 只有写入成功才记入缓存，失败的重投递仍会再次写入
        self.dedup.lock().await.remember(key, *reading);
        meter_telemetry::record_persisted();
        Ok(PersistOutcome::Stored)
    }

    /// 解码日志载荷后写入。
    pub async fn persist_payload(&self, payload: &[u8]) -> Result<PersistOutcome, PersistenceError> {
        let reading = Reading::from_payload(payload)?;
        self.persist(&reading).await
    }

    async fn insert_with_retry(&self, reading: &StoredReading) -> Result<(), StorageError> {
        let mut attempt = 0;
        loop {
            match self.store.insert_reading(reading).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    attempt += 1;
                    if attempt > self.config.max_retries {
                        return Err(err);
                    }
                    warn!(
                        target: "meter.persist",
                        meter_id = reading.meter_id,
                        attempt = attempt,
                        error = %err,
                        "reading_insert_retry"
                    );
                }
            }
        }
    }
}

#[async_trait]
impl RecordHandler for PersistenceSink {
    async fn handle(&self, record: StreamRecord) -> Result<(), LogError> {
        self.persist_payload(&record.payload)
            .await
            .map(|_| ())
            .map_err(|err| LogError::Handler(err.to_string()))
    }
}
