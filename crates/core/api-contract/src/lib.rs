//! 稳定的线上契约：HTTP 响应封装与 WebSocket 消息。

use chrono::{DateTime, Utc};
use domain::Reading;
use serde::{Deserialize, Deserializer, Serialize};

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 订阅消息（客户端 → 服务端）。
///
/// 同一连接上后一条订阅覆盖前一条。`meterId` 兼容数字字符串。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    #[serde(deserialize_with = "meter_id_from_number_or_string")]
    pub meter_id: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MeterIdRepr {
    Number(u32),
    Text(String),
}

fn meter_id_from_number_or_string<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match MeterIdRepr::deserialize(deserializer)? {
        MeterIdRepr::Number(value) => Ok(value),
        MeterIdRepr::Text(text) => text
            .trim()
            .parse::<u32>()
            .map_err(|_| serde::de::Error::custom(format!("invalid meterId: {}", text))),
    }
}

/// 推送给实时客户端的读数。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingDto {
    pub timestamp: DateTime<Utc>,
    pub meter_id: u32,
    pub voltage: String,
    pub current: String,
    pub power: String,
    pub energy: String,
}

impl From<&Reading> for ReadingDto {
    fn from(reading: &Reading) -> Self {
        Self {
            timestamp: reading.recorded_at(),
            meter_id: reading.meter_id,
            voltage: reading.voltage.to_string(),
            current: reading.current.to_string(),
            power: reading.power.to_string(),
            energy: reading.energy.to_string(),
        }
    }
}

/// WebSocket 错误回执。
#[derive(Debug, Serialize)]
pub struct WsErrorDto {
    pub error: String,
}

impl WsErrorDto {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// 计数器快照返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub packets_received: u64,
    pub decode_failures: u64,
    pub readings_published: u64,
    pub publish_failures: u64,
    pub publish_backpressure: u64,
    pub records_persisted: u64,
    pub persist_failures: u64,
    pub duplicates_skipped: u64,
    pub readings_fanned_out: u64,
    pub pushes_delivered: u64,
    pub push_failures: u64,
    pub subscription_updates: u64,
    pub active_subscriptions: u64,
}
