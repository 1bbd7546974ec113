use std::io;

/// 采集网关错误（仅启动阶段返回，运行期错误按连接记录日志）。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}
