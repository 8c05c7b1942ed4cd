// RobotRelayService/src/state.rs

//! 应用级共享状态。
//!
//! 网关链路、订阅注册表和摄像头管理器都是进程内单例：在启动时构造一次，
//! 以 `Arc` 共享给每个会话任务与 HTTP 处理器，不通过全局变量查找。

use std::sync::Arc;

use crate::camera::{provider_from_config, CameraManager, CameraProvider};
use crate::config::AppConfig;
use crate::db::Store;
use crate::gateway::GatewayLink;
use crate::ws_server::command_mixer::MixerPolicy;
use crate::ws_server::connection_manager::ConnectionManager;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub registry: Arc<ConnectionManager>,
    pub gateway: Arc<GatewayLink>,
    pub cameras: Arc<CameraManager>,
    pub mixer: MixerPolicy,
}

impl AppState {
    /// 按配置构造全部共享组件，摄像头后端由 `config.camera.backend` 决定。
    pub fn new(config: AppConfig, store: Arc<dyn Store>) -> Self {
        let provider = provider_from_config(&config.camera);
        Self::with_camera_provider(config, store, provider)
    }

    /// 使用指定的摄像头后端构造共享组件。
    pub fn with_camera_provider(config: AppConfig, store: Arc<dyn Store>, provider: Arc<dyn CameraProvider>) -> Self {
        let registry = Arc::new(ConnectionManager::new(Arc::clone(&store)));
        let gateway = Arc::new(GatewayLink::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            config.gateway.clone(),
        ));
        let cameras = Arc::new(CameraManager::new(provider, config.camera.jpeg_quality));
        let mixer = MixerPolicy::from(&config.control);
        Self {
            config: Arc::new(config),
            store,
            registry,
            gateway,
            cameras,
            mixer,
        }
    }
}
