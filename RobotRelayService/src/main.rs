use anyhow::Context;
use log::{error, info};
use robot_relay_service::config;
use robot_relay_service::db::memory_store::MemoryStore;
use robot_relay_service::db::Store;
use robot_relay_service::state::AppState;
use robot_relay_service::ws_server::service::WsService;
use std::sync::Arc;

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("[主程序] 收到 Ctrl+C，开始优雅关闭..."),
        Err(e) => error!("[主程序] 监听 Ctrl+C 信号失败: {}", e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 配置先于日志加载，日志级别取自配置；设置了 RUST_LOG 时以环境变量为准
    let app_config = config::init_config();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(app_config.log_level.as_str()))
        .format_timestamp_millis()
        .init();
    info!(
        "[主程序] 日志系统已初始化 (env_logger)，配置级别: {}。服务地址: {}:{}",
        app_config.log_level, app_config.server.host, app_config.server.port
    );

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new(app_config.store.max_documents_per_collection));
    if let Err(e) = store.ping().await {
        error!("[主程序] 致命错误：存储不可用，服务拒绝启动: {}", e);
        std::process::exit(1);
    }
    info!("[主程序] 文档存储已就绪。");

    let state = AppState::new(app_config.clone(), store);
    info!(
        "[主程序] 共享状态已创建 (摄像头后端: {:?})。",
        state.config.camera.backend
    );

    let service = WsService::new(state);
    let listener = service.bind().await.context("绑定监听地址失败")?;
    info!("[主程序] 正在启动 HTTP / WebSocket 服务...");
    service
        .serve(listener, shutdown_signal())
        .await
        .context("服务运行失败")?;

    info!("[主程序] 服务已退出。");
    Ok(())
}
