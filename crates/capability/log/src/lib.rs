//! 有序分区日志抽象（LogPort）及其适配器。
//!
//! 采集端只依赖 [`LogPort::publish`]，消费端只依赖 [`LogPort::subscribe`]，
//! 两侧互不感知。

pub mod error;
pub mod memory;
pub mod mqtt;
pub mod port;

pub use error::LogError;
pub use memory::{InMemoryLog, InMemoryLogConfig};
pub use mqtt::{MqttLog, MqttLogConfig};
pub use port::{Ack, LogPort, RecordHandler, Subscription};
