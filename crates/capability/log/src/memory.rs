//! 进程内分区日志
//!
//! 单进程部署与测试使用。每个 topic 固定分区数，按 key 的 FNV-1a 哈希选分区，
//! 无 key 时轮询。每个分区保留最近 `retention` 条记录，落后的消费者跳过已淘汰的
//! offset。消费组按分区维护游标；同组多个订阅共享游标（竞争消费，分区内保序）。
//! 新消费组从最早保留的 offset 开始消费。

use crate::error::LogError;
use crate::port::{Ack, LogPort, RecordHandler, Subscription, deliver};
use async_trait::async_trait;
use domain::{StreamRecord, now_epoch_ms};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, warn};

/// 内存日志配置。
#[derive(Debug, Clone)]
pub struct InMemoryLogConfig {
    /// 每个 topic 的分区数（至少 1）
    pub partitions: u32,
    /// 每个分区保留的记录数，0 表示不限
    pub retention: usize,
}

impl Default for InMemoryLogConfig {
    fn default() -> Self {
        Self {
            partitions: 4,
            retention: 100_000,
        }
    }
}

struct PartitionState {
    base_offset: u64,
    records: VecDeque<StreamRecord>,
}

enum Fetch {
    Record(StreamRecord),
    Evicted { base_offset: u64 },
    Empty,
}

struct Partition {
    index: u32,
    retention: usize,
    state: Mutex<PartitionState>,
    /// 下一个待写入的 offset
    high_watermark: watch::Sender<u64>,
}

impl Partition {
    fn new(index: u32, retention: usize) -> Self {
        let (high_watermark, _) = watch::channel(0);
        Self {
            index,
            retention,
            state: Mutex::new(PartitionState {
                base_offset: 0,
                records: VecDeque::new(),
            }),
            high_watermark,
        }
    }

    fn state(&self) -> MutexGuard<'_, PartitionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn append(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> u64 {
        let mut state = self.state();
        let offset = state.base_offset + state.records.len() as u64;
        state.records.push_back(StreamRecord {
            topic: topic.to_string(),
            partition: self.index,
            offset,
            key: key.map(str::to_string),
            payload,
            published_at_ms: now_epoch_ms(),
        });
        if self.retention > 0 && state.records.len() > self.retention {
            state.records.pop_front();
            state.base_offset += 1;
        }
        drop(state);
        self.high_watermark.send_replace(offset + 1);
        offset
    }

    fn fetch(&self, offset: u64) -> Fetch {
        let state = self.state();
        if offset < state.base_offset {
            return Fetch::Evicted {
                base_offset: state.base_offset,
            };
        }
        let index = (offset - state.base_offset) as usize;
        match state.records.get(index) {
            Some(record) => Fetch::Record(record.clone()),
            None => Fetch::Empty,
        }
    }
}

/// 消费组在每个分区上的游标。
struct GroupCursors {
    cursors: Vec<Arc<tokio::sync::Mutex<u64>>>,
}

struct Topic {
    name: String,
    partitions: Vec<Arc<Partition>>,
    round_robin: AtomicU32,
    groups: Mutex<HashMap<String, Arc<GroupCursors>>>,
}

impl Topic {
    fn new(name: &str, config: &InMemoryLogConfig) -> Self {
        let partitions = (0..config.partitions.max(1))
            .map(|index| Arc::new(Partition::new(index, config.retention)))
            .collect();
        Self {
            name: name.to_string(),
            partitions,
            round_robin: AtomicU32::new(0),
            groups: Mutex::new(HashMap::new()),
        }
    }

    fn partition_count(&self) -> u32 {
        self.partitions.len() as u32
    }

    fn select_partition(&self, key: Option<&str>) -> &Arc<Partition> {
        let count = self.partition_count();
        let index = match key {
            Some(key) => partition_for_key(key, count),
            None => self.round_robin.fetch_add(1, Ordering::Relaxed) % count,
        };
        &self.partitions[index as usize]
    }

    fn group(&self, group: &str) -> Arc<GroupCursors> {
        let mut groups = self.groups.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        groups
            .entry(group.to_string())
            .or_insert_with(|| {
                Arc::new(GroupCursors {
                    cursors: self
                        .partitions
                        .iter()
                        .map(|_| Arc::new(tokio::sync::Mutex::new(0)))
                        .collect(),
                })
            })
            .clone()
    }
}

/// FNV-1a 哈希取模，保证同一 key 总落在同一分区。
fn partition_for_key(key: &str, partitions: u32) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in key.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash % partitions
}

/// 进程内分区日志。
pub struct InMemoryLog {
    config: InMemoryLogConfig,
    topics: Mutex<HashMap<String, Arc<Topic>>>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self::with_config(InMemoryLogConfig::default())
    }

    pub fn with_config(config: InMemoryLogConfig) -> Self {
        Self {
            config,
            topics: Mutex::new(HashMap::new()),
        }
    }

    fn topic(&self, name: &str) -> Arc<Topic> {
        let mut topics = self.topics.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        topics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Topic::new(name, &self.config)))
            .clone()
    }

    /// 当前保留的全部记录（按分区、offset 排序，用于测试与诊断）。
    pub fn snapshot(&self, topic: &str) -> Vec<StreamRecord> {
        let topic = self.topic(topic);
        topic
            .partitions
            .iter()
            .flat_map(|partition| partition.state().records.iter().cloned().collect::<Vec<_>>())
            .collect()
    }
}

impl Default for InMemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogPort for InMemoryLog {
    async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: Vec<u8>,
    ) -> Result<Ack, LogError> {
        let topic = self.topic(topic);
        let partition = topic.select_partition(key);
        let offset = partition.append(&topic.name, key, payload);
        Ok(Ack {
            partition: partition.index,
            offset: Some(offset),
        })
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        handler: Arc<dyn RecordHandler>,
    ) -> Result<Subscription, LogError> {
        let topic = self.topic(topic);
        let cursors = topic.group(group);
        let workers = topic
            .partitions
            .iter()
            .zip(cursors.cursors.iter())
            .map(|(partition, cursor)| {
                tokio::spawn(run_partition_worker(
                    Arc::clone(partition),
                    Arc::clone(cursor),
                    group.to_string(),
                    Arc::clone(&handler),
                ))
            })
            .collect();
        debug!(
            target: "meter.log",
            topic = %topic.name,
            group = %group,
            partitions = topic.partition_count(),
            "memory_log_subscribed"
        );
        Ok(Subscription::new(topic.name.clone(), group, workers))
    }
}

async fn run_partition_worker(
    partition: Arc<Partition>,
    cursor: Arc<tokio::sync::Mutex<u64>>,
    group: String,
    handler: Arc<dyn RecordHandler>,
) {
    let mut watermark = partition.high_watermark.subscribe();
    loop {
        {
            // 处理期间持有游标锁：同组竞争消费时分区内仍然有序
            let mut next = cursor.lock().await;
            match partition.fetch(*next) {
                Fetch::Record(record) => {
                    let offset = record.offset;
                    deliver(handler.as_ref(), record, &group).await;
                    *next = offset + 1;
                    continue;
                }
                Fetch::Evicted { base_offset } => {
                    warn!(
                        target: "meter.log",
                        group = %group,
                        partition = partition.index,
                        from_offset = *next,
                        to_offset = base_offset,
                        "records_evicted_before_delivery"
                    );
                    *next = base_offset;
                    continue;
                }
                Fetch::Empty => {}
            }
        }
        if watermark.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_maps_to_same_partition() {
        let first = partition_for_key("42", 4);
        for _ in 0..10 {
            assert_eq!(partition_for_key("42", 4), first);
        }
        assert!(first < 4);
    }

    #[test]
    fn retention_evicts_oldest() {
        let partition = Partition::new(0, 2);
        for i in 0..3u8 {
            partition.append("t", None, vec![i]);
        }
        assert!(matches!(
            partition.fetch(0),
            Fetch::Evicted { base_offset: 1 }
        ));
        match partition.fetch(2) {
            Fetch::Record(record) => assert_eq!(record.payload, vec![2]),
            _ => panic!("expected record"),
        }
        assert!(matches!(partition.fetch(3), Fetch::Empty));
    }
}
