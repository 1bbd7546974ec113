/// 推送失败：客户端已断开、未注册或发送队列已满。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    #[error("client not connected")]
    NotConnected,
    #[error("client channel closed")]
    Closed,
    #[error("client send queue full")]
    Full,
}

/// 分发错误。
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("payload error: {0}")]
    Payload(#[from] domain::PayloadError),
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}
