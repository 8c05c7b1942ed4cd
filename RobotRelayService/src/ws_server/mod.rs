// RobotRelayService/src/ws_server/mod.rs

//! 浏览器侧 WebSocket 服务逻辑模块。

pub mod client_session;
pub mod command_mixer;
pub mod connection_manager;
pub mod control_session;
pub mod relay_session;
pub mod service;
pub mod telemetry;
