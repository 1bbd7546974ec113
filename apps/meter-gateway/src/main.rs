//! 电表遥测网关：TCP 采集 → 有序日志 → 持久化 / WebSocket 实时分发。

mod consumers;
mod handlers;
mod ingest;
mod routes;

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use meter_config::{AppConfig, LogBackend};
use meter_log::{InMemoryLog, InMemoryLogConfig, LogPort, MqttLog, MqttLogConfig};
use meter_realtime::{ConnectionTable, SubscriptionRegistry};
use meter_storage::{InMemoryReadingStore, PgReadingStore, ReadingStore};
use meter_telemetry::{init_tracing, new_request_ids};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub registry: Arc<SubscriptionRegistry>,
    pub connections: Arc<ConnectionTable>,
}

impl AppState {
    /// `send_queue` 为每个 WebSocket 客户端的待发送消息上限。
    pub fn new(send_queue: usize) -> Self {
        Self {
            registry: Arc::new(SubscriptionRegistry::new()),
            connections: Arc::new(ConnectionTable::with_capacity(send_queue)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    let log = build_log(&config);
    let store = build_store(&config).await?;
    let state = AppState::new(config.ws_send_queue);

    // 消费者先订阅，新消费组从最早的记录开始
    let subscriptions = consumers::spawn_consumers(&config, Arc::clone(&log), store, &state).await?;

    let gateway = ingest::build_gateway(&config, Arc::clone(&log));
    let ingest_listener = gateway.bind().await?;
    let ingest_task = ingest::spawn_ingest(gateway.clone(), ingest_listener);

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.ws_addr).await?;
    info!(target: "meter.ws", addr = %config.ws_addr, "http_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 停止接收新连接，等待在途发布完成后再停止消费
    gateway.close();
    gateway.drain().await;
    if let Err(err) = ingest_task.await {
        warn!(target: "meter.ingest", error = %err, "ingest_task_join_failed");
    }
    drop(subscriptions);
    info!("shutdown complete");
    Ok(())
}

fn build_log(config: &AppConfig) -> Arc<dyn LogPort> {
    match config.log_backend {
        LogBackend::Memory => {
            info!(
                partitions = config.log_partitions,
                retention = config.log_retention,
                "log backend: memory"
            );
            Arc::new(InMemoryLog::with_config(InMemoryLogConfig {
                partitions: config.log_partitions,
                retention: config.log_retention,
            }))
        }
        LogBackend::Mqtt => {
            let mqtt_config = MqttLogConfig {
                host: config.mqtt_host.clone(),
                port: config.mqtt_port,
                username: config.mqtt_username.clone(),
                password: config.mqtt_password.clone(),
                client_id: config.mqtt_client_id.clone(),
                ack_timeout: Duration::from_secs(config.mqtt_ack_timeout_secs),
                ..MqttLogConfig::default()
            };
            info!(
                "log backend: mqtt {}:{} client_id={}",
                mqtt_config.host, mqtt_config.port, mqtt_config.client_id
            );
            Arc::new(MqttLog::new(mqtt_config))
        }
    }
}

async fn build_store(
    config: &AppConfig,
) -> Result<Arc<dyn ReadingStore>, Box<dyn std::error::Error>> {
    match config.database_url.as_deref() {
        Some(url) => {
            let store = PgReadingStore::connect(url).await?;
            store.migrate().await?;
            info!("reading store: postgres");
            Ok(Arc::new(store))
        }
        None => {
            warn!("reading store: memory (METER_DATABASE_URL not set)");
            Ok(Arc::new(InMemoryReadingStore::new()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl_c_listener_failed");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

pub(crate) async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    // 生成 request_id 与 trace_id，并注入请求扩展与日志
    let ids = new_request_ids();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(ids.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %method,
        path = %path
    );

    let mut response = next.run(req).instrument(span).await;
    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&ids.request_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response.headers_mut().insert(
        "x-trace-id",
        HeaderValue::from_str(&ids.trace_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}
