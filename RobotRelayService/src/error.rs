use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_websocket_utils::error::WsError;
use serde_json::json;
use thiserror::Error;

use crate::db::StoreError;

/// 应用的主要错误类型
///
/// 会话内部的错误在会话内处理 (记录日志、发送错误帧)，不会跨会话传播；
/// `AppError` 用于启动流程与 HTTP 接口，最终映射为进程退出或 HTTP 响应。
#[derive(Error, Debug)]
pub enum AppError {
    #[error("WebSocket 服务错误: {0}")]
    WebSocketService(String),

    #[error("存储错误: {0}")]
    StoreError(#[from] StoreError),

    #[error("网关错误: {0}")]
    Gateway(#[from] WsError),

    #[error("无效请求: {0}")]
    InvalidRequest(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Gateway(WsError::NotConnected) => StatusCode::BAD_REQUEST,
            AppError::StoreError(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("[HTTP] 请求处理失败 ({}): {}", status, self);
        } else {
            log::warn!("[HTTP] 请求被拒绝 ({}): {}", status, self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
