//! 通用枚举模块。
//!
//! 本模块定义了中继服务与浏览器客户端之间共享的枚举类型：
//! 订阅通道类型 (`ChannelKind`)、机器人运行状态 (`RobotStatusKind`)
//! 以及遥操作按键动作 (`KeyAction`)。
//!
//! 所有枚举都以小写字符串形式序列化，与浏览器端约定的 JSON 字段取值保持一致。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 浏览器 WebSocket 会话所属的逻辑通道。
///
/// 通道类型决定了会话使用哪一个遥测生成器、推送节奏，
/// 以及在订阅注册表中加入哪一个分桶。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// 机器人状态监控 (约 1 秒一帧)。
    Monitoring,
    /// 激光雷达与 IMU 传感器数据 (约 100 毫秒一帧)。
    Sensor,
    /// 摄像头 JPEG 帧 (目标约 33 毫秒一帧)。
    Camera,
    /// 操作员遥控通道，只接收按键事件，不推送遥测。
    Control,
}

impl ChannelKind {
    /// 全部通道类型，按固定顺序排列，便于诊断输出。
    pub const ALL: [ChannelKind; 4] = [
        ChannelKind::Monitoring,
        ChannelKind::Sensor,
        ChannelKind::Camera,
        ChannelKind::Control,
    ];

    /// 返回通道的小写名称 (与 URL 路径段、JSON 取值一致)。
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Monitoring => "monitoring",
            ChannelKind::Sensor => "sensor",
            ChannelKind::Camera => "camera",
            ChannelKind::Control => "control",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monitoring" => Ok(ChannelKind::Monitoring),
            "sensor" => Ok(ChannelKind::Sensor),
            "camera" => Ok(ChannelKind::Camera),
            "control" => Ok(ChannelKind::Control),
            other => Err(format!("未知的通道类型: {}", other)),
        }
    }
}

/// 监控通道上报的机器人运行状态。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RobotStatusKind {
    Active,
    Charging,
    Idle,
    Error,
}

impl RobotStatusKind {
    pub const ALL: [RobotStatusKind; 4] = [
        RobotStatusKind::Active,
        RobotStatusKind::Charging,
        RobotStatusKind::Idle,
        RobotStatusKind::Error,
    ];
}

/// 遥操作通道中的按键动作。
///
/// 客户端省略 `action` 字段时按 `keydown` 处理。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyAction {
    #[default]
    KeyDown,
    KeyUp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ChannelKind::Monitoring).unwrap();
        assert_eq!(json, "\"monitoring\"");
        let parsed: ChannelKind = serde_json::from_str("\"camera\"").unwrap();
        assert_eq!(parsed, ChannelKind::Camera);
    }

    #[test]
    fn channel_kind_from_path_segment() {
        for kind in ChannelKind::ALL {
            assert_eq!(kind.as_str().parse::<ChannelKind>(), Ok(kind));
            assert_eq!(kind.to_string(), kind.as_str());
        }
        assert!("lidar".parse::<ChannelKind>().is_err());
    }

    #[test]
    fn key_action_defaults_to_keydown() {
        assert_eq!(KeyAction::default(), KeyAction::KeyDown);
        let up: KeyAction = serde_json::from_str("\"keyup\"").unwrap();
        assert_eq!(up, KeyAction::KeyUp);
        assert!(serde_json::from_str::<KeyAction>("\"keypress\"").is_err());
    }
}
