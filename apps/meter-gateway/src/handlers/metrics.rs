//! 计数器快照
//!
//! - GET /metrics

use api_contract::{ApiResponse, MetricsSnapshotDto};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use meter_telemetry::metrics;

use crate::AppState;

pub async fn get_metrics(State(state): State<AppState>) -> Response {
    let snapshot = metrics().snapshot();
    (
        StatusCode::OK,
        Json(ApiResponse::success(MetricsSnapshotDto {
            connections_opened: snapshot.connections_opened,
            connections_closed: snapshot.connections_closed,
            packets_received: snapshot.packets_received,
            decode_failures: snapshot.decode_failures,
            readings_published: snapshot.readings_published,
            publish_failures: snapshot.publish_failures,
            publish_backpressure: snapshot.publish_backpressure,
            records_persisted: snapshot.records_persisted,
            persist_failures: snapshot.persist_failures,
            duplicates_skipped: snapshot.duplicates_skipped,
            readings_fanned_out: snapshot.readings_fanned_out,
            pushes_delivered: snapshot.pushes_delivered,
            push_failures: snapshot.push_failures,
            subscription_updates: snapshot.subscription_updates,
            active_subscriptions: state.registry.len() as u64,
        })),
    )
        .into_response()
}
