//! `rust_websocket_utils` 提供连接机器人消息网关所需的 WebSocket 客户端工具。
//!
//! 主要模块包括：
//! - `message`: 网关 JSON 帧 `BridgeFrame` 及其构造/解析。
//! - `error`: 库中使用的统一错误类型 `WsError`。
//! - `client`: 出站 WebSocket 连接 (带超时) 以及帧的发送与接收。

pub mod client;
pub mod error;
pub mod message;
