// RobotRelayService/src/api/status_handler.rs

//! 诊断接口：订阅注册表快照与摄像头探测。

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::camera::CameraProbe;
use crate::state::AppState;

/// `GET /api/ws/status`
pub async fn ws_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "connections": state.registry.status(),
        "total_sessions": state.registry.total_sessions(),
        "gateway_connections": state.gateway.connection_count(),
        "connected_robots": state.gateway.connected_robots(),
    }))
}

/// `GET /api/camera/status/{robot_id}`
pub async fn camera_status(State(state): State<AppState>, Path(robot_id): Path<String>) -> Json<CameraProbe> {
    Json(state.cameras.probe(&robot_id).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::DisabledCameraProvider;
    use crate::config::AppConfig;
    use crate::db::memory_store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn ws_status_lists_every_channel() {
        let state = AppState::new(AppConfig::default(), Arc::new(MemoryStore::default()));
        let Json(body) = ws_status(State(state)).await;
        for channel in ["monitoring", "sensor", "camera", "control"] {
            assert!(body["connections"][channel].is_object(), "缺少通道 {}", channel);
        }
        assert_eq!(body["gateway_connections"], 0);
        assert_eq!(body["total_sessions"], 0);
    }

    #[tokio::test]
    async fn camera_status_reports_synthetic_resolution() {
        let state = AppState::new(AppConfig::default(), Arc::new(MemoryStore::default()));
        let Json(probe) = camera_status(State(state.clone()), Path("r1".to_string())).await;
        assert!(probe.available);
        assert!(!probe.in_use);
        assert_eq!(probe.width, Some(state.config.camera.width));
        assert_eq!(probe.height, Some(state.config.camera.height));
        assert!(!state.cameras.is_open("r1").await);
    }

    #[tokio::test]
    async fn camera_status_reports_missing_device() {
        let state = AppState::with_camera_provider(
            AppConfig::default(),
            Arc::new(MemoryStore::default()),
            Arc::new(DisabledCameraProvider),
        );
        let Json(probe) = camera_status(State(state), Path("r1".to_string())).await;
        assert!(!probe.available);
        assert!(probe.error.is_some());
    }
}
