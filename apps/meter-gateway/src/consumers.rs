//! 日志消费者装配：持久化消费组与实时分发消费组。

use crate::AppState;
use meter_config::AppConfig;
use meter_log::{LogError, LogPort, Subscription};
use meter_persistence::{PersistenceConfig, PersistenceSink};
use meter_realtime::FanoutGateway;
use meter_storage::ReadingStore;
use std::sync::Arc;
use tracing::info;

/// 按配置订阅消费组；返回的句柄被 drop 时停止消费。
pub async fn spawn_consumers(
    config: &AppConfig,
    log: Arc<dyn LogPort>,
    store: Arc<dyn ReadingStore>,
    state: &AppState,
) -> Result<Vec<Subscription>, LogError> {
    let mut subscriptions = Vec::new();

    if config.persist_enabled {
        let sink = PersistenceSink::with_config(
            store,
            PersistenceConfig {
                dedup_cache_size: config.dedup_cache_size,
                max_retries: config.persist_max_retries,
            },
        );
        let subscription = log
            .subscribe(&config.topic, &config.persist_group, Arc::new(sink))
            .await?;
        info!(
            target: "meter.persist",
            topic = %config.topic,
            group = %config.persist_group,
            "persistence_consumer_started"
        );
        subscriptions.push(subscription);
    } else {
        info!(target: "meter.persist", "persistence_consumer_disabled");
    }

    if config.fanout_enabled {
        let fanout = FanoutGateway::new(
            state.registry.clone(),
            state.connections.clone(),
        );
        let subscription = log
            .subscribe(&config.topic, &config.fanout_group, Arc::new(fanout))
            .await?;
        info!(
            target: "meter.fanout",
            topic = %config.topic,
            group = %config.fanout_group,
            "fanout_consumer_started"
        );
        subscriptions.push(subscription);
    } else {
        info!(target: "meter.fanout", "fanout_consumer_disabled");
    }

    Ok(subscriptions)
}
