//! 合成遥测数据生成器。
//!
//! 监控与传感器通道在没有真实机器人数据源时，按固定节奏推送随机生成的数据帧。
//! 摄像头通道的数据由 [`crate::camera`] 采集，不在此处生成。

use chrono::Utc;
use common_models::enums::{ChannelKind, RobotStatusKind};
use common_models::ws_payloads::{
    Axis3, ImuData, LidarData, Location, MonitoringPayload, Pose2D, SensorPayload,
};
use rand::seq::SliceRandom;
use rand::Rng;
use std::f64::consts::PI;
use std::time::Duration;

use crate::config::TelemetryConfig;

const TASKS: [Option<&str>; 4] = [None, Some("patrol"), Some("delivery"), Some("cleaning")];

/// 生成一帧监控数据。
pub fn monitoring_payload<R: Rng + ?Sized>(robot_id: &str, rng: &mut R) -> MonitoringPayload {
    let status = *RobotStatusKind::ALL
        .choose(rng)
        .unwrap_or(&RobotStatusKind::Idle);
    let current_task = TASKS.choose(rng).copied().flatten().map(str::to_string);
    MonitoringPayload {
        id: robot_id.to_string(),
        status,
        battery: rng.gen_range(20..=100),
        location: Location {
            x: rng.gen_range(0.0..=100.0),
            y: rng.gen_range(0.0..=100.0),
        },
        current_task,
        last_updated: Utc::now(),
    }
}

/// 生成一帧传感器数据。
///
/// # 参数
/// * `lidar_point_count` - 激光雷达点数，坐标范围 `[-10, 10]`。
pub fn sensor_payload<R: Rng + ?Sized>(robot_id: &str, lidar_point_count: usize, rng: &mut R) -> SensorPayload {
    let points = (0..lidar_point_count)
        .map(|_| Location {
            x: rng.gen_range(-10.0..=10.0),
            y: rng.gen_range(-10.0..=10.0),
        })
        .collect();
    let axis = |rng: &mut R| Axis3 {
        x: rng.gen_range(-1.0..=1.0),
        y: rng.gen_range(-1.0..=1.0),
        z: rng.gen_range(-1.0..=1.0),
    };
    let acceleration = axis(&mut *rng);
    let gyro = axis(&mut *rng);
    SensorPayload {
        robot_id: robot_id.to_string(),
        timestamp: Utc::now(),
        lidar_data: LidarData { points },
        imu_data: ImuData { acceleration, gyro },
        position: Pose2D {
            x: rng.gen_range(-10.0..=10.0),
            y: rng.gen_range(-10.0..=10.0),
            orientation: rng.gen_range(-PI..=PI),
        },
    }
}

/// 按通道分派的合成数据生成器。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyntheticGenerator {
    Monitoring,
    Sensor { lidar_point_count: usize },
}

impl SyntheticGenerator {
    /// 返回通道对应的合成生成器；摄像头与遥控通道没有合成生成器。
    pub fn for_channel(channel: ChannelKind, config: &TelemetryConfig) -> Option<Self> {
        match channel {
            ChannelKind::Monitoring => Some(SyntheticGenerator::Monitoring),
            ChannelKind::Sensor => Some(SyntheticGenerator::Sensor {
                lidar_point_count: config.lidar_point_count,
            }),
            ChannelKind::Camera | ChannelKind::Control => None,
        }
    }

    /// 生成一帧并序列化为 JSON 文本。
    pub fn produce(&self, robot_id: &str) -> Result<String, serde_json::Error> {
        let mut rng = rand::thread_rng();
        match self {
            SyntheticGenerator::Monitoring => serde_json::to_string(&monitoring_payload(robot_id, &mut rng)),
            SyntheticGenerator::Sensor { lidar_point_count } => {
                serde_json::to_string(&sensor_payload(robot_id, *lidar_point_count, &mut rng))
            }
        }
    }
}

/// 通道的推送间隔。遥控通道不推送，返回 `None`。
pub fn cadence(channel: ChannelKind, config: &TelemetryConfig) -> Option<Duration> {
    let millis = match channel {
        ChannelKind::Monitoring => config.monitoring_interval_ms,
        ChannelKind::Sensor => config.sensor_interval_ms,
        ChannelKind::Camera => config.camera_interval_ms,
        ChannelKind::Control => return None,
    };
    Some(Duration::from_millis(millis.max(1)))
}
