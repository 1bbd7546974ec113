//! LogPort 接口与消费任务句柄

use crate::error::LogError;
use async_trait::async_trait;
use domain::StreamRecord;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

/// 发布确认。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub partition: u32,
    /// broker 不暴露 offset 时为 None
    pub offset: Option<u64>,
}

/// 投递记录处理器。
#[async_trait]
pub trait RecordHandler: Send + Sync {
    async fn handle(&self, record: StreamRecord) -> Result<(), LogError>;
}

/// 有序、分区、可回放的发布/订阅流。
#[async_trait]
pub trait LogPort: Send + Sync {
    /// 追加一条记录。`key` 决定分区（同 key 保序），为 None 时由实现自行分配。
    async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: Vec<u8>,
    ) -> Result<Ack, LogError>;

    /// 以消费组身份订阅。不同消费组各自收到全部记录。
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        handler: Arc<dyn RecordHandler>,
    ) -> Result<Subscription, LogError>;
}

/// 订阅句柄：持有消费任务，drop 时停止投递。
pub struct Subscription {
    topic: String,
    group: String,
    workers: Vec<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, group: impl Into<String>, workers: Vec<JoinHandle<()>>) -> Self {
        Self {
            topic: topic.into(),
            group: group.into(),
            workers,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// 所有消费任务均已退出。
    pub fn is_finished(&self) -> bool {
        self.workers.iter().all(|worker| worker.is_finished())
    }

    /// 停止投递。
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

/// 投递一条记录；处理器错误只记录日志，不重试。
pub(crate) async fn deliver(handler: &dyn RecordHandler, record: StreamRecord, group: &str) {
    let topic = record.topic.clone();
    let partition = record.partition;
    let offset = record.offset;
    if let Err(err) = handler.handle(record).await {
        warn!(
            target: "meter.log",
            topic = %topic,
            group = %group,
            partition = partition,
            offset = offset,
            error = %err,
            "record_handler_failed"
        );
    }
}
