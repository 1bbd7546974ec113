//! 实时推送 WebSocket
//!
//! - GET /ws
//!
//! 客户端发送 `{"meterId": 42}` 设置过滤条件（后一条覆盖前一条），
//! 之后收到该电表的每条读数。无法解析的消息只回一条错误，原过滤条件不变。

use crate::AppState;
use api_contract::{SubscribeRequest, WsErrorDto};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use domain::ClientId;
use futures_util::{SinkExt, StreamExt};
use meter_realtime::ClientChannels;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| ws_session(socket, state))
}

async fn ws_session(socket: WebSocket, state: AppState) {
    let client = ClientId::new();
    let (mut sink, mut stream) = socket.split();
    let mut outbound = state.connections.register(client);
    info!(target: "meter.ws", client_id = %client, "ws_client_connected");

    // 写任务：推送通道 → socket
    let mut writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if sink.send(Message::Text(message.to_string())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_client_message(&state, client, text.as_bytes()),
                Some(Ok(Message::Binary(bytes))) => handle_client_message(&state, client, &bytes),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(target: "meter.ws", client_id = %client, error = %err, "ws_receive_failed");
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    state.registry.remove(client);
    state.connections.drop_client(client);
    writer.abort();
    info!(target: "meter.ws", client_id = %client, "ws_client_disconnected");
}

/// 处理一条客户端消息：更新订阅或回复错误。
pub(crate) fn handle_client_message(state: &AppState, client: ClientId, raw: &[u8]) {
    match serde_json::from_slice::<SubscribeRequest>(raw) {
        Ok(request) => {
            let previous = state.registry.upsert(client, request.meter_id);
            meter_telemetry::record_subscription_update();
            info!(
                target: "meter.ws",
                client_id = %client,
                meter_id = request.meter_id,
                previous = ?previous,
                "subscription_updated"
            );
        }
        Err(err) => {
            warn!(target: "meter.ws", client_id = %client, error = %err, "subscribe_message_invalid");
            let reply = match serde_json::to_string(&WsErrorDto::new("invalid subscribe message")) {
                Ok(reply) => reply,
                Err(_) => return,
            };
            if let Err(err) = state.connections.push(client, Arc::from(reply)) {
                debug!(target: "meter.ws", client_id = %client, error = %err, "error_reply_failed");
            }
        }
    }
}
