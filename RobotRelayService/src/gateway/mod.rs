//! 机器人消息网关链路。
//!
//! - `link`: 每个机器人一个出站 WebSocket 连接，负责订阅、发布与接收循环。
//! - `topics`: 固定订阅的话题集合及其处理器。

pub mod link;
pub mod topics;

pub use link::GatewayLink;
