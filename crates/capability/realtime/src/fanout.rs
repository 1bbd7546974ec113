//! 实时分发：日志记录 → 匹配客户端 → 推送
//!
//! 每条记录只序列化一次，所有匹配客户端共享同一份消息。
//! 推送失败的客户端从注册表中移除，不影响其他客户端和后续记录。

use crate::channels::ClientChannels;
use crate::error::RealtimeError;
use crate::registry::SubscriptionRegistry;
use api_contract::ReadingDto;
use async_trait::async_trait;
use domain::{ClientId, Reading, StreamRecord};
use meter_log::{LogError, RecordHandler};
use std::sync::Arc;
use tracing::debug;

/// 单条读数的分发结果。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub matched: usize,
    pub delivered: usize,
    /// 推送失败后被移除的客户端
    pub removed: Vec<ClientId>,
}

#[derive(Clone)]
pub struct FanoutGateway {
    registry: Arc<SubscriptionRegistry>,
    channels: Arc<dyn ClientChannels>,
}

impl FanoutGateway {
    pub fn new(registry: Arc<SubscriptionRegistry>, channels: Arc<dyn ClientChannels>) -> Self {
        Self { registry, channels }
    }

    /// 将读数推送给订阅了该 meterId 的全部客户端。
    pub fn dispatch(&self, reading: &Reading) -> Result<FanoutReport, RealtimeError> {
        let clients = self.registry.matching_clients(reading.meter_id);
        let mut report = FanoutReport {
            matched: clients.len(),
            ..FanoutReport::default()
        };
        if clients.is_empty() {
            return Ok(report);
        }

        let message: Arc<str> = Arc::from(serde_json::to_string(&ReadingDto::from(reading))?);
        for client in clients {
            match self.channels.push(client, Arc::clone(&message)) {
                Ok(()) => {
                    report.delivered += 1;
                    meter_telemetry::record_push_delivered();
                }
                Err(err) => {
                    meter_telemetry::record_push_failure();
                    debug!(
                        target: "meter.fanout",
                        client_id = %client,
                        meter_id = reading.meter_id,
                        error = %err,
                        "push_failed_client_removed"
                    );
                    self.registry.remove(client);
                    self.channels.drop_client(client);
                    report.removed.push(client);
                }
            }
        }
        meter_telemetry::record_reading_fanned_out();
        Ok(report)
    }

    /// 解码日志载荷后分发。
    pub fn dispatch_payload(&self, payload: &[u8]) -> Result<FanoutReport, RealtimeError> {
        let reading = Reading::from_payload(payload)?;
        self.dispatch(&reading)
    }
}

#[async_trait]
impl RecordHandler for FanoutGateway {
    async fn handle(&self, record: StreamRecord) -> Result<(), LogError> {
        self.dispatch_payload(&record.payload)
            .map(|_| ())
            .map_err(|err| LogError::Handler(err.to_string()))
    }
}
