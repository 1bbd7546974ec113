//! 基于 MQTT broker 的 LogPort 适配器
//!
//! 发布使用 QoS1，收到该报文 pkid 的 PUBACK 才算确认；连接错误、请求队列已满或
//! 确认超时都返回 [`LogError::Publish`]。消费组映射为共享订阅 `$share/{group}/{topic}`，
//! 每个订阅独立 client（持久会话），重连后 broker 继续投递。
//! MQTT 没有分区与 offset：确认中 partition 固定为 0，offset 为 None。

use crate::error::LogError;
use crate::port::{Ack, LogPort, RecordHandler, Subscription, deliver};
use async_trait::async_trait;
use domain::{StreamRecord, now_epoch_ms};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// MQTT 日志配置。
#[derive(Debug, Clone)]
pub struct MqttLogConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// client id 前缀，发布端与各消费组在此基础上派生
    pub client_id: String,
    pub keep_alive: Duration,
    /// 请求队列容量，满时发布立即失败
    pub channel_capacity: usize,
    /// 等待 PUBACK 的上限
    pub ack_timeout: Duration,
}

impl Default for MqttLogConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id: "meter-gateway".to_string(),
            keep_alive: Duration::from_secs(30),
            channel_capacity: 64,
            ack_timeout: Duration::from_secs(10),
        }
    }
}

impl MqttLogConfig {
    fn options(&self, client_id: String) -> MqttOptions {
        let mut options = MqttOptions::new(client_id, self.host.clone(), self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(false);
        if let (Some(username), Some(password)) = (self.username.as_ref(), self.password.as_ref()) {
            options.set_credentials(username, password);
        }
        options
    }
}

type AckSender = oneshot::Sender<Result<(), String>>;

/// 发布确认跟踪。
///
/// 请求通道按入队顺序发出报文，因此 `queued` 与 `Outgoing::Publish` 事件一一对应；
/// 发出后按 pkid 等待 PUBACK。等待方已收到失败结果的条目保留为 None 占位，
/// 保证后续事件仍能对齐。
#[derive(Default)]
struct AckTracker {
    queued: VecDeque<Option<AckSender>>,
    inflight: HashMap<u16, Option<AckSender>>,
}

impl AckTracker {
    fn on_outgoing_publish(&mut self, pkid: u16) {
        // 重连后重发的报文沿用原 pkid
        if self.inflight.contains_key(&pkid) {
            return;
        }
        if let Some(waiter) = self.queued.pop_front() {
            self.inflight.insert(pkid, waiter);
        }
    }

    fn on_puback(&mut self, pkid: u16) {
        if let Some(Some(waiter)) = self.inflight.remove(&pkid) {
            let _ = waiter.send(Ok(()));
        }
    }

    fn fail_pending(&mut self, reason: &str) {
        for waiter in self.queued.iter_mut().chain(self.inflight.values_mut()) {
            if let Some(waiter) = waiter.take() {
                let _ = waiter.send(Err(reason.to_string()));
            }
        }
    }
}

fn lock(acks: &Mutex<AckTracker>) -> MutexGuard<'_, AckTracker> {
    acks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// MQTT 日志适配器。
pub struct MqttLog {
    config: MqttLogConfig,
    publisher: AsyncClient,
    acks: Arc<Mutex<AckTracker>>,
    publisher_loop: JoinHandle<()>,
}

impl MqttLog {
    /// 建立发布端连接（需在 tokio 运行时内调用）。
    pub fn new(config: MqttLogConfig) -> Self {
        let client_id = format!("{}-publisher", config.client_id);
        let (publisher, eventloop) =
            AsyncClient::new(config.options(client_id.clone()), config.channel_capacity);
        let acks = Arc::new(Mutex::new(AckTracker::default()));
        let publisher_loop =
            tokio::spawn(drive_publisher(client_id, eventloop, Arc::clone(&acks)));
        Self {
            config,
            publisher,
            acks,
            publisher_loop,
        }
    }
}

impl Drop for MqttLog {
    fn drop(&mut self) {
        self.publisher_loop.abort();
    }
}

#[async_trait]
impl LogPort for MqttLog {
    async fn publish(
        &self,
        topic: &str,
        _key: Option<&str>,
        payload: Vec<u8>,
    ) -> Result<Ack, LogError> {
        let (tx, rx) = oneshot::channel();
        {
            // 入队与登记在同一把锁内完成，事件循环看到的顺序与 queued 一致
            let mut acks = lock(&self.acks);
            self.publisher
                .try_publish(topic, QoS::AtLeastOnce, false, payload)
                .map_err(|err| LogError::Publish(err.to_string()))?;
            acks.queued.push_back(Some(tx));
        }
        match tokio::time::timeout(self.config.ack_timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(Ack {
                partition: 0,
                offset: None,
            }),
            Ok(Ok(Err(reason))) => Err(LogError::Publish(reason)),
            Ok(Err(_)) => Err(LogError::Publish("publisher event loop stopped".to_string())),
            Err(_) => Err(LogError::Publish(format!(
                "no puback within {:?}",
                self.config.ack_timeout
            ))),
        }
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        handler: Arc<dyn RecordHandler>,
    ) -> Result<Subscription, LogError> {
        let client_id = subscriber_client_id(&self.config.client_id, group);
        let (client, eventloop) =
            AsyncClient::new(self.config.options(client_id), self.config.channel_capacity);
        let filter = format!("$share/{}/{}", group, topic);
        client
            .subscribe(filter.clone(), QoS::AtLeastOnce)
            .await
            .map_err(|err| LogError::Subscribe(err.to_string()))?;
        debug!(target: "meter.log", filter = %filter, "mqtt_log_subscribed");
        let worker = tokio::spawn(drive_subscriber(
            client,
            eventloop,
            group.to_string(),
            handler,
        ));
        Ok(Subscription::new(topic, group, vec![worker]))
    }
}

/// 每个订阅独立的 client id，同组多个订阅不会互相踢下线。
fn subscriber_client_id(prefix: &str, group: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, group, &suffix[..8])
}

async fn drive_publisher(
    client_id: String,
    mut eventloop: EventLoop,
    acks: Arc<Mutex<AckTracker>>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                lock(&acks).on_outgoing_publish(pkid);
            }
            Ok(Event::Incoming(Packet::PubAck(puback))) => {
                lock(&acks).on_puback(puback.pkid);
            }
            Ok(_) => {}
            Err(err) => {
                let reason = err.to_string();
                lock(&acks).fail_pending(&reason);
                warn!(
                    target: "meter.log",
                    client_id = %client_id,
                    error = %reason,
                    "mqtt_publisher_connection_error"
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

// client 移入任务：只要任务存活，请求通道就不会关闭
async fn drive_subscriber(
    _client: AsyncClient,
    mut eventloop: EventLoop,
    group: String,
    handler: Arc<dyn RecordHandler>,
) {
    let mut offset = 0u64;
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let record = StreamRecord {
                    topic: publish.topic.clone(),
                    partition: 0,
                    offset,
                    key: None,
                    payload: publish.payload.to_vec(),
                    published_at_ms: now_epoch_ms(),
                };
                offset += 1;
                deliver(handler.as_ref(), record, &group).await;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(
                    target: "meter.log",
                    group = %group,
                    error = %err,
                    "mqtt_subscriber_connection_error"
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiter(tracker: &mut AckTracker) -> oneshot::Receiver<Result<(), String>> {
        let (tx, rx) = oneshot::channel();
        tracker.queued.push_back(Some(tx));
        rx
    }

    #[test]
    fn subscriber_client_ids_are_unique_per_subscription() {
        let first = subscriber_client_id("meter-gateway", "websocket-group");
        let second = subscriber_client_id("meter-gateway", "websocket-group");
        assert!(first.starts_with("meter-gateway-websocket-group-"));
        assert_eq!(first.len(), "meter-gateway-websocket-group-".len() + 8);
        assert_ne!(first, second);
    }

    #[test]
    fn puback_resolves_matching_publish() {
        let mut tracker = AckTracker::default();
        let mut first = waiter(&mut tracker);
        let mut second = waiter(&mut tracker);
        tracker.on_outgoing_publish(1);
        tracker.on_outgoing_publish(2);

        tracker.on_puback(2);
        assert_eq!(second.try_recv().expect("acked"), Ok(()));
        assert!(first.try_recv().is_err());

        tracker.on_puback(1);
        assert_eq!(first.try_recv().expect("acked"), Ok(()));
        assert!(tracker.inflight.is_empty());
    }

    #[test]
    fn resent_publish_keeps_its_waiter() {
        let mut tracker = AckTracker::default();
        let mut first = waiter(&mut tracker);
        let mut second = waiter(&mut tracker);
        tracker.on_outgoing_publish(1);
        // 重连后 pkid 1 重发，不应占用下一条发布
        tracker.on_outgoing_publish(1);
        tracker.on_outgoing_publish(2);

        tracker.on_puback(1);
        tracker.on_puback(2);
        assert_eq!(first.try_recv().expect("acked"), Ok(()));
        assert_eq!(second.try_recv().expect("acked"), Ok(()));
    }

    #[test]
    fn connection_error_fails_every_pending_publish() {
        let mut tracker = AckTracker::default();
        let mut sent = waiter(&mut tracker);
        let mut queued = waiter(&mut tracker);
        tracker.on_outgoing_publish(1);

        tracker.fail_pending("connection refused");
        assert_eq!(
            sent.try_recv().expect("failed"),
            Err("connection refused".to_string())
        );
        assert!(queued.try_recv().expect("failed").is_err());

        // 失败后的占位仍与后续事件对齐
        let mut next = waiter(&mut tracker);
        tracker.on_puback(1);
        // 已失败的排队发布先发出，随后才是 next
        tracker.on_outgoing_publish(1);
        tracker.on_outgoing_publish(2);
        tracker.on_puback(1);
        assert!(next.try_recv().is_err());
        tracker.on_puback(2);
        assert_eq!(next.try_recv().expect("acked"), Ok(()));
        assert!(tracker.inflight.is_empty());
        assert!(tracker.queued.is_empty());
    }
}
