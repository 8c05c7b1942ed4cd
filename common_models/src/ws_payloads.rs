// common_models/src/ws_payloads.rs

//! 浏览器 WebSocket 通道上传输的各类 Payload 结构体定义。
//!
//! - 监控通道: [`MonitoringPayload`]
//! - 传感器通道: [`SensorPayload`]
//! - 摄像头通道: [`CameraFramePayload`] / [`ErrorPayload`]
//! - 遥控通道: 上行 [`ControlInput`]，下行 [`ControlReply`]
//! - 网关转发: [`GatewayForwardPayload`]

use crate::enums::{KeyAction, RobotStatusKind};
use crate::robot_models::Twist;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 平面坐标。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

/// 监控通道的单帧数据。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MonitoringPayload {
    /// 机器人 ID。
    pub id: String,
    pub status: RobotStatusKind,
    /// 电量百分比，取值 `[0, 100]`。
    pub battery: u8,
    pub location: Location,
    /// 当前执行的任务名称，空闲时为 `null`。
    pub current_task: Option<String>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LidarData {
    pub points: Vec<Location>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Axis3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ImuData {
    pub acceleration: Axis3,
    pub gyro: Axis3,
}

/// 机器人位姿 (位置 + 朝向，朝向单位为弧度)。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub orientation: f64,
}

/// 传感器通道的单帧数据。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SensorPayload {
    pub robot_id: String,
    pub timestamp: DateTime<Utc>,
    pub lidar_data: LidarData,
    pub imu_data: ImuData,
    pub position: Pose2D,
}

/// 摄像头通道的单帧数据，`image` 为 base64 编码的 JPEG。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CameraFramePayload {
    pub robot_id: String,
    pub frame_number: u64,
    pub timestamp: DateTime<Utc>,
    pub image: String,
    pub status: String,
}

/// 会话终止前发送给浏览器的错误帧 `{error}`。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorPayload {
    pub error: String,
}

impl ErrorPayload {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

/// 遥控通道上行的按键事件。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ControlInput {
    pub key: String,
    #[serde(default)]
    pub action: KeyAction,
}

/// 遥控通道下行的应答帧，按 `status` 字段区分成功与失败。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ControlReply {
    Ok {
        /// 当前处于按下状态的全部按键。
        pressed_keys: Vec<String>,
        /// 本次混合得到的速度指令 (数值形式)。
        twist: Twist,
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

impl ControlReply {
    pub fn error(message: impl Into<String>) -> Self {
        ControlReply::Error { message: message.into() }
    }
}

/// 网关消息转发给浏览器时的格式。
///
/// `message_type` 由话题路径扁平化得到，例如 `/robot_status` 变为 `robot_status`。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GatewayForwardPayload {
    pub message_type: String,
    pub robot_id: String,
    pub topic: String,
    pub msg: Value,
}
