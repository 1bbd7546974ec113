//! 采集链路装配：配置 → IngestGateway → accept 任务。

use meter_config::{AppConfig, IngestFraming};
use meter_ingest::{Framing, IngestConfig, IngestGateway};
use meter_log::LogPort;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub fn build_gateway(config: &AppConfig, log: Arc<dyn LogPort>) -> IngestGateway {
    let framing = match config.ingest_framing {
        IngestFraming::Chunk => Framing::Chunk,
        IngestFraming::Fixed => Framing::Fixed,
    };
    let ingest_config = IngestConfig {
        listen_addr: config.ingest_addr.clone(),
        topic: config.topic.clone(),
        framing,
        max_connections: config.ingest_max_connections,
        max_inflight_publishes: config.ingest_max_inflight_publishes,
    };
    info!(
        target: "meter.ingest",
        addr = %ingest_config.listen_addr,
        topic = %ingest_config.topic,
        framing = ?ingest_config.framing,
        "ingest_configured"
    );
    IngestGateway::new(log, ingest_config)
}

/// 在后台运行 accept 循环，直到 [`IngestGateway::close`]。
pub fn spawn_ingest(gateway: IngestGateway, listener: TcpListener) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = gateway.serve(listener).await {
            warn!(target: "meter.ingest", error = %err, "ingest_stopped_with_error");
        }
    })
}
