//! # 电表采集网关
//!
//! 监听 TCP 端口，电表保持长连接持续上报 20 字节报文。
//! 每个报文解码为 [`domain::Reading`] 后以 meterId 为 key 发布到 [`meter_log::LogPort`]。
//!
//! 连接状态：`Connected → Streaming → Closed`。

mod error;
mod gateway;

pub use error::IngestError;
pub use gateway::{ConnectionState, ConnectionSummary, Framing, IngestConfig, IngestGateway};
