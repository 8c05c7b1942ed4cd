// RobotRelayService/src/ws_server/service.rs

//! HTTP / WebSocket 服务：路由装配、连接升级与服务启动。

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use common_models::enums::ChannelKind;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use log::{debug, info, warn};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::control_session::run_control_session;
use super::relay_session::run_relay_session;
use crate::api;
use crate::error::AppError;
use crate::state::AppState;

/// 启动会话的发送任务：把出站队列中的 JSON 文本逐条写入套接字。
///
/// 队列的全部发送端被释放后，任务发送 Close 帧并结束；写入失败时任务提前结束，
/// 会话随后向队列发送时会得到错误并退出。
pub(crate) fn spawn_sender_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<String>,
    client_id: Uuid,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(e) = ws_sender.send(Message::Text(text)).await {
                debug!("[SenderTask {}] 写入套接字失败，发送任务结束: {}", client_id, e);
                return;
            }
        }
        if let Err(e) = ws_sender.send(Message::Close(None)).await {
            debug!("[SenderTask {}] 发送 Close 帧失败 (对端可能已断开): {}", client_id, e);
        }
        let _ = ws_sender.close().await;
        debug!("[SenderTask {}] 出站队列已关闭，发送任务结束", client_id);
    })
}

/// `/ws/{channel}/{robot_id}` 升级处理器。
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path((channel, robot_id)): Path<(String, String)>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let channel = match channel.parse::<ChannelKind>() {
        Ok(channel) => channel,
        Err(e) => {
            warn!("[WsService] 拒绝来自 {} 的升级请求: {}", addr, e);
            return (StatusCode::NOT_FOUND, Json(json!({ "error": e }))).into_response();
        }
    };
    debug!("[WsService] {} 请求升级: 通道={}, 机器人={}", addr, channel, robot_id);
    ws.on_upgrade(move |socket| async move {
        match channel {
            ChannelKind::Control => run_control_session(socket, addr, robot_id, state).await,
            telemetry => run_relay_session(socket, addr, telemetry, robot_id, state).await,
        }
    })
}

/// 装配全部路由：WebSocket 通道与 HTTP 接口。
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/:channel/:robot_id", get(ws_handler))
        .merge(api::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// WebSocket 服务结构体，封装了共享状态。
pub struct WsService {
    state: AppState,
}

impl WsService {
    pub fn new(state: AppState) -> Self {
        info!("[WsService] 服务实例已创建");
        Self { state }
    }

    /// 按配置绑定监听地址。
    pub async fn bind(&self) -> Result<TcpListener, AppError> {
        let server = &self.state.config.server;
        let listen_addr = format!("{}:{}", server.host, server.port);
        TcpListener::bind(&listen_addr)
            .await
            .map_err(|e| AppError::WebSocketService(format!("绑定 {} 失败: {}", listen_addr, e)))
    }

    /// 在给定的监听器上提供服务，直到 `shutdown` 完成。
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener
            .local_addr()
            .map_err(|e| AppError::WebSocketService(e.to_string()))?;
        info!("[WsService] 正在监听 {}", local_addr);
        let app = build_router(self.state.clone());
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| AppError::WebSocketService(format!("服务运行出错: {}", e)))?;

        info!("[WsService] 服务已停止，正在断开全部网关连接...");
        self.state.gateway.disconnect_all().await;
        Ok(())
    }
}
