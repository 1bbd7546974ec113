//! 协议错误类型定义

/// 报文解码错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// 可用字节数少于定长布局所需
    #[error("truncated packet: expected {expected} bytes, got {actual}")]
    TruncatedPacket { expected: usize, actual: usize },
}
