//! # 电表报文协议
//!
//! 电表通过长连接上报 20 字节小端定长报文，本模块负责将其解码为 [`domain::Reading`]。
//!
//! - [`decode`]：纯函数，无副作用，可在多个采集连接上并发调用
//! - [`encode`]：按同一布局编码（测试夹具与联调工具使用）
//!
//! 长度不足 [`PACKET_LEN`] 时返回 [`DecodeError::TruncatedPacket`]，
//! 不做任何业务含义上的校验。

mod error;
mod packet;

pub use error::DecodeError;
pub use packet::{PACKET_LEN, decode, encode};
