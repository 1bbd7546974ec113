//! # 实时分发
//!
//! - [`SubscriptionRegistry`]：客户端 ↔ meterId 过滤条件
//! - [`ConnectionTable`]：客户端推送通道（[`ClientChannels`] 的生产实现）
//! - [`FanoutGateway`]：作为日志消费者，把读数推给匹配的客户端

mod channels;
mod error;
mod fanout;
mod registry;

pub use channels::{ClientChannels, ConnectionTable, DEFAULT_SEND_QUEUE};
pub use error::{PushError, RealtimeError};
pub use fanout::{FanoutGateway, FanoutReport};
pub use registry::SubscriptionRegistry;
