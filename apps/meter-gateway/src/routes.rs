//! 路由定义
//!
//! - WebSocket：/ws
//! - 健康检查：/health
//! - 计数器快照：/metrics

use super::AppState;
use super::handlers::*;
use axum::{Router, middleware, routing::get};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .with_state(state)
        // 注入 request_id/trace_id
        .layer(middleware::from_fn(super::request_context))
}
