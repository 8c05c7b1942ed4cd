//! `robot_relay_service` 服务端核心库。
//!
//! 在机器人消息网关 (rosbridge 风格的 JSON over WebSocket) 与浏览器操作员之间做实时中继：
//! 遥测数据向浏览器扇出，键盘遥控指令混合为速度指令后发布给机器人。
//!
//! 主要模块包括：
//! - `api`: HTTP 接口 (网关连接管理、诊断)。
//! - `camera`: 摄像头设备的打开、共享与 JPEG 编码。
//! - `config`: 应用配置的加载与访问。
//! - `db`: 文档存储抽象与进程内实现。
//! - `error`: 应用错误类型。
//! - `gateway`: 到机器人网关的出站连接与话题处理。
//! - `state`: 应用级共享状态。
//! - `ws_server`: 浏览器会话、订阅注册表、遥控指令混合。

pub mod api;
pub mod camera;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod state;
pub mod ws_server;
