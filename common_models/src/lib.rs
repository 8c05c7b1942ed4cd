//! `common_models` 公共模型库 crate。
//!
//! 本 crate 集中定义了机器人中继服务 (`RobotRelayService`) 与浏览器客户端、
//! 以及其他 Rust 组件之间共享的数据结构和枚举类型。
//!
//! 主要包含以下类型的模型：
//! - **通用枚举 (`enums`)**: 通道类型 (`ChannelKind`)、机器人状态、按键动作。
//! - **机器人模型 (`robot_models`)**: 速度指令 `Twist` 及其网关线格式转换。
//! - **WebSocket 消息负载 (`ws_payloads`)**: 各通道下行遥测帧、遥控上行事件与应答。
//!
//! 所有模型都派生 `serde::Serialize` / `serde::Deserialize`、`Debug` 与 `Clone`。

pub mod enums;
pub mod robot_models;
pub mod ws_payloads;
