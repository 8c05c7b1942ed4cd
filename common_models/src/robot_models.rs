//! 机器人运动指令相关的数据模型。
//!
//! `Twist` 是中继服务内部使用的速度指令 (数值形式)，
//! 发往机器人消息网关时需要转换为 `geometry_msgs/msg/Twist` 约定的线格式：
//! 所有数值字段都编码为十进制字符串。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// 网关上速度指令的话题名称。
pub const CMD_VEL_TOPIC: &str = "/cmd_vel";
/// 网关上速度指令的消息类型。
pub const TWIST_MSG_TYPE: &str = "geometry_msgs/msg/Twist";

/// 三维向量 (线速度或角速度分量)。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// 速度指令：`linear.x` 为前进速度 (m/s)，`angular.z` 为转向角速度 (rad/s)。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

impl Twist {
    /// 构造只包含平面运动分量的速度指令。
    pub fn planar(linear_x: f64, angular_z: f64) -> Self {
        Self {
            linear: Vector3 { x: linear_x, y: 0.0, z: 0.0 },
            angular: Vector3 { x: 0.0, y: 0.0, z: angular_z },
        }
    }

    /// 全停指令。
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// 转换为网关兼容的消息体，数值字段编码为十进制字符串。
    ///
    /// 例如 `0.26` 编码为 `"0.26"`，零值统一编码为 `"0.0"`。
    pub fn to_bridge_msg(&self) -> Value {
        json!({
            "linear": {
                "x": decimal_string(self.linear.x),
                "y": decimal_string(self.linear.y),
                "z": decimal_string(self.linear.z),
            },
            "angular": {
                "x": decimal_string(self.angular.x),
                "y": decimal_string(self.angular.y),
                "z": decimal_string(self.angular.z),
            }
        })
    }
}

/// 以十进制字符串表示浮点数，整数值补齐 `.0` 后缀，负零归一为 `"0.0"`。
pub fn decimal_string(value: f64) -> String {
    if value == 0.0 {
        return "0.0".to_string();
    }
    let text = value.to_string();
    if text.contains('.') || text.contains("inf") || text.contains("NaN") {
        text
    } else {
        format!("{}.0", text)
    }
}
