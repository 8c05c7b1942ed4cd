// RobotRelayService/src/api/robot_handler.rs

//! 机器人网关连接相关的 HTTP 接口。
//!
//! 接口只负责参数整理，连接的建立、断开与发布全部委托给 [`crate::gateway::GatewayLink`]。

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::info;
use rust_websocket_utils::error::WsError;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::db::ROBOTS;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub uri: String,
    #[serde(default)]
    pub robot_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub topic: String,
    pub msg_type: String,
    #[serde(default)]
    pub data: Value,
}

/// `POST /robot/connect/{robot_id}`
///
/// 连接失败时返回 502 与 `{success:false, message}`。
pub async fn connect_robot(
    State(state): State<AppState>,
    Path(robot_id): Path<String>,
    Json(request): Json<ConnectRequest>,
) -> Result<Response, AppError> {
    if request.uri.trim().is_empty() {
        return Err(AppError::InvalidRequest("uri 不能为空".to_string()));
    }
    info!("[RobotApi] 请求连接机器人 {} -> {}", robot_id, request.uri);

    if !state.gateway.connect(&robot_id, &request.uri).await {
        let body = json!({
            "success": false,
            "message": format!("无法连接机器人 {} 的网关 {}", robot_id, request.uri),
        });
        return Ok((StatusCode::BAD_GATEWAY, Json(body)).into_response());
    }

    if let Some(name) = request.robot_name {
        let mut patch = Map::new();
        patch.insert("name".to_string(), Value::String(name));
        state.store.update(ROBOTS, &robot_id, patch, true).await?;
    }

    Ok(Json(json!({
        "success": true,
        "message": format!("机器人 {} 已连接", robot_id),
    }))
    .into_response())
}

/// `POST /robot/disconnect/{robot_id}`，重复调用同样成功。
pub async fn disconnect_robot(State(state): State<AppState>, Path(robot_id): Path<String>) -> Json<Value> {
    state.gateway.disconnect(&robot_id).await;
    Json(json!({
        "success": true,
        "message": format!("机器人 {} 已断开", robot_id),
    }))
}

/// `POST /robot/publish/{robot_id}`
pub async fn publish_to_robot(
    State(state): State<AppState>,
    Path(robot_id): Path<String>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<Value>, AppError> {
    if !state.gateway.is_connected(&robot_id) {
        return Err(AppError::Gateway(WsError::NotConnected));
    }
    let sent = state
        .gateway
        .publish(&robot_id, &request.topic, &request.msg_type, request.data)
        .await;
    if !sent {
        // 发布失败时网关链路已被拆除
        return Err(AppError::Gateway(WsError::ConnectionClosed));
    }
    Ok(Json(json!({ "success": true })))
}

/// `GET /robot/status/{robot_id}`
pub async fn robot_status(
    State(state): State<AppState>,
    Path(robot_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let record = state.store.find(ROBOTS, &robot_id).await?;
    Ok(Json(json!({
        "robot_id": robot_id,
        "connected": state.gateway.is_connected(&robot_id),
        "gateway_uri": state.gateway.connection_uri(&robot_id),
        "record": record,
    })))
}

/// `GET /robot/list`
pub async fn list_robots(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "robots": state.gateway.connected_robots() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api;
    use crate::config::AppConfig;
    use crate::db::memory_store::MemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> (axum::Router, AppState) {
        let mut config = AppConfig::default();
        config.gateway.connect_timeout_ms = 300;
        let state = AppState::new(config, Arc::new(MemoryStore::default()));
        (api::routes().with_state(state.clone()), state)
    }

    async fn call(app: axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn root_reports_service_name() {
        let (app, _) = app();
        let (status, body) = call(app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Robot Relay Service");
    }

    #[tokio::test]
    async fn publish_without_connection_is_bad_request() {
        let (app, _) = app();
        let body = json!({ "topic": "/cmd_vel", "msg_type": "geometry_msgs/msg/Twist", "data": {} });
        let (status, body) = call(app, "POST", "/robot/publish/r1", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn unreachable_gateway_reports_failure() {
        let (app, state) = app();
        let body = json!({ "uri": "ws://127.0.0.1:1", "robot_name": "alpha" });
        let (status, body) = call(app, "POST", "/robot/connect/r1", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["success"], false);
        assert!(!state.gateway.is_connected("r1"));
    }

    #[tokio::test]
    async fn empty_uri_is_rejected() {
        let (app, _) = app();
        let (status, _) = call(app, "POST", "/robot/connect/r1", Some(json!({ "uri": " " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_status_reflects_it() {
        let (app, _) = app();
        let (status, body) = call(app.clone(), "POST", "/robot/disconnect/r9", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, body) = call(app.clone(), "GET", "/robot/status/r9", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connected"], false);
        assert!(body["record"].is_null());

        let (_, body) = call(app, "GET", "/robot/list", None).await;
        assert_eq!(body["robots"], json!([]));
    }
}
