//! 追踪初始化、请求 ID 生成与进程级计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub packets_received: u64,
    pub decode_failures: u64,
    pub readings_published: u64,
    pub publish_failures: u64,
    pub publish_backpressure: u64,
    pub records_persisted: u64,
    pub persist_failures: u64,
    pub duplicates_skipped: u64,
    pub readings_fanned_out: u64,
    pub pushes_delivered: u64,
    pub push_failures: u64,
    pub subscription_updates: u64,
}

/// 进程级计数器。
pub struct TelemetryMetrics {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    packets_received: AtomicU64,
    decode_failures: AtomicU64,
    readings_published: AtomicU64,
    publish_failures: AtomicU64,
    publish_backpressure: AtomicU64,
    records_persisted: AtomicU64,
    persist_failures: AtomicU64,
    duplicates_skipped: AtomicU64,
    readings_fanned_out: AtomicU64,
    pushes_delivered: AtomicU64,
    push_failures: AtomicU64,
    subscription_updates: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            readings_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            publish_backpressure: AtomicU64::new(0),
            records_persisted: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            readings_fanned_out: AtomicU64::new(0),
            pushes_delivered: AtomicU64::new(0),
            push_failures: AtomicU64::new(0),
            subscription_updates: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            readings_published: self.readings_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            publish_backpressure: self.publish_backpressure.load(Ordering::Relaxed),
            records_persisted: self.records_persisted.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            readings_fanned_out: self.readings_fanned_out.load(Ordering::Relaxed),
            pushes_delivered: self.pushes_delivered.load(Ordering::Relaxed),
            push_failures: self.push_failures.load(Ordering::Relaxed),
            subscription_updates: self.subscription_updates.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局计数器实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info，可用 RUST_LOG 覆盖）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录电表连接建立。
pub fn record_connection_opened() {
    metrics().connections_opened.fetch_add(1, Ordering::Relaxed);
}

/// 记录电表连接关闭。
pub fn record_connection_closed() {
    metrics().connections_closed.fetch_add(1, Ordering::Relaxed);
}

/// 记录收到的报文块。
pub fn record_packet_received() {
    metrics().packets_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录解码失败。
pub fn record_decode_failure() {
    metrics().decode_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录发布成功。
pub fn record_reading_published() {
    metrics().readings_published.fetch_add(1, Ordering::Relaxed);
}

/// 记录发布失败。
pub fn record_publish_failure() {
    metrics().publish_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录因在途发布数已满而丢弃的读数。
pub fn record_publish_backpressure() {
    metrics()
        .publish_backpressure
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录持久化成功。
pub fn record_persisted() {
    metrics().records_persisted.fetch_add(1, Ordering::Relaxed);
}

/// 记录持久化失败。
pub fn record_persist_failure() {
    metrics().persist_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录重复投递被跳过。
pub fn record_duplicate_skipped() {
    metrics().duplicates_skipped.fetch_add(1, Ordering::Relaxed);
}

/// 记录分发处理的读数。
pub fn record_reading_fanned_out() {
    metrics().readings_fanned_out.fetch_add(1, Ordering::Relaxed);
}

/// 记录推送成功。
pub fn record_push_delivered() {
    metrics().pushes_delivered.fetch_add(1, Ordering::Relaxed);
}

/// 记录推送失败（随后移除订阅）。
pub fn record_push_failure() {
    metrics().push_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录订阅更新。
pub fn record_subscription_update() {
    metrics()
        .subscription_updates
        .fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_metrics_start_at_zero() {
        let snapshot = TelemetryMetrics::new().snapshot();
        assert_eq!(snapshot.packets_received, 0);
        assert_eq!(snapshot.push_failures, 0);
    }

    #[test]
    fn record_helpers_bump_global_counters() {
        let before = metrics().snapshot();
        record_decode_failure();
        record_push_failure();
        record_subscription_update();
        let after = metrics().snapshot();
        // 其他测试并发累加，只检查下界
        assert!(after.decode_failures > before.decode_failures);
        assert!(after.push_failures > before.push_failures);
        assert!(after.subscription_updates > before.subscription_updates);
    }

    #[test]
    fn request_ids_are_distinct() {
        let ids = new_request_ids();
        assert_ne!(ids.request_id, ids.trace_id);
        assert_eq!(ids.request_id.len(), 36);
    }
}
