//! 客户端推送通道
//!
//! 每条 WebSocket 连接注册一个有界发送端，写任务从接收端取消息写入 socket。
//! 接收端被 drop（连接已断开）或队列已满（客户端读得太慢）时推送失败。

use crate::error::PushError;
use dashmap::DashMap;
use domain::ClientId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// 每个客户端默认的待发送消息上限
pub const DEFAULT_SEND_QUEUE: usize = 256;

/// 推送接口。
pub trait ClientChannels: Send + Sync {
    /// 将已序列化的消息交给客户端的发送队列。
    fn push(&self, client: ClientId, message: Arc<str>) -> Result<(), PushError>;

    /// 释放客户端的推送通道。
    fn drop_client(&self, client: ClientId);
}

/// 连接表：client → 发送端。
#[derive(Debug)]
pub struct ConnectionTable {
    senders: DashMap<ClientId, mpsc::Sender<Arc<str>>>,
    capacity: usize,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SEND_QUEUE)
    }

    /// `capacity` 为每个客户端的待发送消息上限（至少 1）。
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            senders: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// 为客户端注册发送通道，返回写任务使用的接收端。
    pub fn register(&self, client: ClientId) -> mpsc::Receiver<Arc<str>> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.senders.insert(client, tx);
        rx
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientChannels for ConnectionTable {
    fn push(&self, client: ClientId, message: Arc<str>) -> Result<(), PushError> {
        let sender = self
            .senders
            .get(&client)
            .map(|sender| sender.clone())
            .ok_or(PushError::NotConnected)?;
        sender.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => PushError::Full,
            TrySendError::Closed(_) => PushError::Closed,
        })
    }

    fn drop_client(&self, client: ClientId) {
        self.senders.remove(&client);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_reaches_registered_receiver() {
        let table = ConnectionTable::new();
        let client = ClientId::new();
        let mut rx = table.register(client);
        table.push(client, Arc::from("hello")).expect("push");
        assert_eq!(rx.try_recv().expect("message").as_ref(), "hello");
    }

    #[test]
    fn push_to_unknown_client_fails() {
        let table = ConnectionTable::new();
        assert_eq!(
            table.push(ClientId::new(), Arc::from("x")),
            Err(PushError::NotConnected)
        );
    }

    #[test]
    fn push_after_receiver_dropped_fails() {
        let table = ConnectionTable::new();
        let client = ClientId::new();
        drop(table.register(client));
        assert_eq!(table.push(client, Arc::from("x")), Err(PushError::Closed));
        table.drop_client(client);
        assert!(table.is_empty());
    }

    #[test]
    fn push_beyond_capacity_fails() {
        let table = ConnectionTable::with_capacity(2);
        let client = ClientId::new();
        let mut rx = table.register(client);
        table.push(client, Arc::from("a")).expect("first");
        table.push(client, Arc::from("b")).expect("second");
        assert_eq!(table.push(client, Arc::from("c")), Err(PushError::Full));

        // 读走一条后恢复
        assert_eq!(rx.try_recv().expect("message").as_ref(), "a");
        table.push(client, Arc::from("d")).expect("after drain");
    }
}
