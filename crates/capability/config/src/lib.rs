//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 有序日志后端。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogBackend {
    /// 进程内分区日志
    Memory,
    /// MQTT broker（共享订阅映射消费组）
    Mqtt,
}

/// 采集连接的分帧方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestFraming {
    /// 每次 socket 读取视为一个报文
    Chunk,
    /// 按 20 字节定长切帧
    Fixed,
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub ingest_addr: String,
    pub ingest_framing: IngestFraming,
    pub ingest_max_connections: usize,
    pub ingest_max_inflight_publishes: usize,
    pub ws_addr: String,
    /// 每个 WebSocket 客户端的待发送消息上限
    pub ws_send_queue: usize,
    pub topic: String,
    pub persist_group: String,
    pub fanout_group: String,
    pub persist_enabled: bool,
    pub fanout_enabled: bool,
    pub log_backend: LogBackend,
    pub log_partitions: u32,
    pub log_retention: usize,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_client_id: String,
    pub mqtt_ack_timeout_secs: u64,
    pub database_url: Option<String>,
    pub dedup_cache_size: usize,
    pub persist_max_retries: usize,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let ingest_addr =
            env::var("METER_INGEST_ADDR").unwrap_or_else(|_| "0.0.0.0:4000".to_string());
        let ingest_framing = read_framing("METER_INGEST_FRAMING")?;
        let ingest_max_connections =
            read_usize_with_default("METER_INGEST_MAX_CONNECTIONS", 1024)?;
        let ingest_max_inflight_publishes =
            read_usize_with_default("METER_INGEST_MAX_INFLIGHT_PUBLISHES", 1024)?;
        let ws_addr = env::var("METER_WS_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let ws_send_queue = read_usize_with_default("METER_WS_SEND_QUEUE", 256)?;
        if ws_send_queue == 0 {
            return Err(ConfigError::Invalid(
                "METER_WS_SEND_QUEUE".to_string(),
                "0".to_string(),
            ));
        }
        let topic = env::var("METER_TOPIC").unwrap_or_else(|_| "meter-readings".to_string());
        let persist_group =
            env::var("METER_PERSIST_GROUP").unwrap_or_else(|_| "datasink-group".to_string());
        let fanout_group =
            env::var("METER_FANOUT_GROUP").unwrap_or_else(|_| "websocket-group".to_string());
        let persist_enabled = read_bool_with_default("METER_PERSIST", true);
        let fanout_enabled = read_bool_with_default("METER_FANOUT", true);
        let log_backend = read_log_backend("METER_LOG_BACKEND")?;
        let log_partitions = read_u32_with_default("METER_LOG_PARTITIONS", 4)?;
        if log_partitions == 0 {
            return Err(ConfigError::Invalid(
                "METER_LOG_PARTITIONS".to_string(),
                "0".to_string(),
            ));
        }
        let log_retention = read_usize_with_default("METER_LOG_RETENTION", 100_000)?;
        let mqtt_host = env::var("METER_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let mqtt_port = read_u16_with_default("METER_MQTT_PORT", 1883)?;
        let mqtt_username = read_optional("METER_MQTT_USERNAME");
        let mqtt_password = read_optional("METER_MQTT_PASSWORD");
        let mqtt_client_id =
            env::var("METER_MQTT_CLIENT_ID").unwrap_or_else(|_| "meter-gateway".to_string());
        let mqtt_ack_timeout_secs = read_u64_with_default("METER_MQTT_ACK_TIMEOUT_SECS", 10)?;
        let database_url = read_optional("METER_DATABASE_URL");
        let dedup_cache_size = read_usize_with_default("METER_DEDUP_CACHE_SIZE", 10_000)?;
        let persist_max_retries = read_usize_with_default("METER_PERSIST_MAX_RETRIES", 0)?;

        Ok(Self {
            ingest_addr,
            ingest_framing,
            ingest_max_connections,
            ingest_max_inflight_publishes,
            ws_addr,
            ws_send_queue,
            topic,
            persist_group,
            fanout_group,
            persist_enabled,
            fanout_enabled,
            log_backend,
            log_partitions,
            log_retention,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_client_id,
            mqtt_ack_timeout_secs,
            database_url,
            dedup_cache_size,
            persist_max_retries,
        })
    }
}

fn read_framing(key: &str) -> Result<IngestFraming, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(IngestFraming::Chunk),
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "chunk" => Ok(IngestFraming::Chunk),
            "fixed" => Ok(IngestFraming::Fixed),
            _ => Err(ConfigError::Invalid(key.to_string(), value)),
        },
    }
}

fn read_log_backend(key: &str) -> Result<LogBackend, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(LogBackend::Memory),
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "memory" => Ok(LogBackend::Memory),
            "mqtt" => Ok(LogBackend::Mqtt),
            _ => Err(ConfigError::Invalid(key.to_string(), value)),
        },
    }
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<usize>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
