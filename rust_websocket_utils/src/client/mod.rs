// rust_websocket_utils/src/client/mod.rs

//! WebSocket 客户端模块：连接机器人消息网关并收发 `BridgeFrame`。

pub mod transport;
