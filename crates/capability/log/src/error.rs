/// 有序日志错误。
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("publish error: {0}")]
    Publish(String),
    #[error("subscribe error: {0}")]
    Subscribe(String),
    #[error("handler error: {0}")]
    Handler(String),
}
