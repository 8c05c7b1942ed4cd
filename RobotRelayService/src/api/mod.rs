// RobotRelayService/src/api/mod.rs

//! HTTP API 请求处理模块。
//!
//! - `robot_handler`: 网关连接管理与手动发布。
//! - `status_handler`: 注册表与摄像头的诊断接口。

pub mod robot_handler;
pub mod status_handler;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

async fn root() -> Json<Value> {
    Json(json!({ "message": "Robot Relay Service" }))
}

/// 全部 HTTP 接口路由，由 `ws_server::service::build_router` 合并。
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/robot/connect/:robot_id", post(robot_handler::connect_robot))
        .route("/robot/disconnect/:robot_id", post(robot_handler::disconnect_robot))
        .route("/robot/publish/:robot_id", post(robot_handler::publish_to_robot))
        .route("/robot/status/:robot_id", get(robot_handler::robot_status))
        .route("/robot/list", get(robot_handler::list_robots))
        .route("/api/ws/status", get(status_handler::ws_status))
        .route("/api/camera/status/:robot_id", get(status_handler::camera_status))
}
