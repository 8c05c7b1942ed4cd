//! 应用配置模块。
//!
//! 配置以 JSON 文件形式保存 (默认文件名 `relay_settings.json`)。启动时加载，
//! 文件不存在或内容损坏时使用默认配置并写回磁盘。
//! 每个配置段都带有 `#[serde(default)]`，因此旧文件中缺失的字段会自动补齐默认值。

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// 配置文件的默认文件名
pub const CONFIG_FILE_NAME: &str = "relay_settings.json";
/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "ROBOT_RELAY_CONFIG";

/// HTTP / WebSocket 服务监听配置
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务绑定的主机地址
    pub host: String,
    /// 服务监听的端口号
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(), // 默认监听所有网络接口
            port: 8000,
        }
    }
}

/// 机器人消息网关连接配置
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    /// 建立连接 (含 WebSocket 握手) 的超时时间（单位：毫秒）
    pub connect_timeout_ms: u64,
    /// 单帧发布的超时时间（单位：毫秒），超时视为连接断开
    pub publish_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            publish_timeout_ms: 2_000,
        }
    }
}

impl GatewayConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

/// 各遥测通道的推送节奏
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TelemetryConfig {
    pub monitoring_interval_ms: u64,
    pub sensor_interval_ms: u64,
    pub camera_interval_ms: u64,
    /// 每帧激光雷达点数
    pub lidar_point_count: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            monitoring_interval_ms: 1_000,
            sensor_interval_ms: 100,
            camera_interval_ms: 33,
            lidar_point_count: 360,
        }
    }
}

/// 摄像头后端类型
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    /// 生成移动测试图案的合成摄像头
    Synthetic,
    /// 无可用设备，所有打开请求都会失败
    Disabled,
}

/// 摄像头采集与编码配置
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CameraConfig {
    pub backend: CameraBackend,
    pub width: u32,
    pub height: u32,
    /// JPEG 编码质量 (1-100)
    pub jpeg_quality: u8,
    /// 连续读帧失败的最大次数，超过后会话以错误结束
    pub max_read_failures: u32,
    /// 两次读帧重试之间的等待时间（单位：毫秒）
    pub retry_delay_ms: u64,
    /// 每隔多少帧写一条 camera_logs 记录
    pub log_every_n_frames: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            backend: CameraBackend::Synthetic,
            width: 640,
            height: 480,
            jpeg_quality: 80,
            max_read_failures: 3,
            retry_delay_ms: 1_000,
            log_every_n_frames: 30,
        }
    }
}

/// 遥控指令混合参数
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ControlConfig {
    /// 前进/后退线速度 (m/s)
    pub base_linear: f64,
    /// 原地转向角速度 (rad/s)
    pub base_angular: f64,
    /// 行进中转向时的角速度 (rad/s)
    pub diagonal_angular: f64,
    /// 行进中转向时线速度的衰减系数
    pub diagonal_damping: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            base_linear: 0.26,
            base_angular: 1.82,
            diagonal_angular: 1.27,
            diagonal_damping: 0.7,
        }
    }
}

/// 文档存储配置
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// 单个集合保留的最大文档数，超出时淘汰最早写入的文档
    pub max_documents_per_collection: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { max_documents_per_collection: 10_000 }
    }
}

/// 应用的主配置结构体
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub telemetry: TelemetryConfig,
    pub camera: CameraConfig,
    pub control: ControlConfig,
    pub store: StoreConfig,
    /// 默认日志级别 (error/warn/info/debug/trace)，`RUST_LOG` 环境变量优先
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            gateway: GatewayConfig::default(),
            telemetry: TelemetryConfig::default(),
            camera: CameraConfig::default(),
            control: ControlConfig::default(),
            store: StoreConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

// 全局静态应用配置实例
static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// 从指定路径加载配置；文件缺失或损坏时使用默认配置并尝试写回。
///
/// # 参数
/// * `config_file_path` - 配置文件路径。
///
/// # 返回
/// 加载到的配置，或默认配置。此函数不会失败，写回失败只记录警告。
pub fn load_or_create_config(config_file_path: &Path) -> AppConfig {
    match fs::read_to_string(config_file_path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("[配置模块] 已成功从配置文件 {:?} 加载应用配置。", config_file_path);
                config
            }
            Err(e) => {
                warn!(
                    "[配置模块] 警告：从 {:?} 反序列化配置失败: {}. 文件可能已损坏。将使用默认配置并尝试覆盖。",
                    config_file_path, e
                );
                let default_config = AppConfig::default();
                save_config(&default_config, config_file_path);
                default_config
            }
        },
        Err(e) => {
            info!(
                "[配置模块] 未在 {:?} 找到配置文件或读取时发生错误 (错误: {}). 将使用默认配置并尝试创建新文件。",
                config_file_path, e
            );
            let default_config = AppConfig::default();
            save_config(&default_config, config_file_path);
            default_config
        }
    }
}

/// 获取配置文件路径：环境变量 > 当前目录 > 用户主目录
fn get_config_file_path() -> PathBuf {
    if let Ok(explicit) = env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(explicit);
    }

    let current_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config_file_path = current_dir.join(CONFIG_FILE_NAME);

    // 当前目录已有配置文件或可写时直接使用
    let current_dir_writable = fs::metadata(&current_dir)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false);
    if config_file_path.exists() || current_dir_writable {
        return config_file_path;
    }

    if let Ok(home) = env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("robot_relay_service")
            .join(CONFIG_FILE_NAME);
    }

    config_file_path
}

/// 保存配置到文件
fn save_config(config: &AppConfig, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("[配置模块] 错误：创建配置目录 {:?} 失败: {}", parent, e);
                return;
            }
        }
    }

    match serde_json::to_string_pretty(config) {
        Ok(content) => {
            if let Err(e) = fs::write(path, content) {
                warn!("[配置模块] 错误：将配置写入文件 {:?} 时失败: {}", path, e);
            } else {
                info!("[配置模块] 已成功将当前配置保存到 {:?}.", path);
            }
        }
        Err(e) => {
            warn!("[配置模块] 错误：序列化配置信息以便保存时失败: {}", e);
        }
    }
}

/// 初始化全局应用配置，重复调用返回首次加载的结果。
pub fn init_config() -> &'static AppConfig {
    if let Some(existing) = APP_CONFIG.get() {
        warn!("[配置模块] 全局应用配置已被初始化，本次 init_config 调用未覆盖已有配置。");
        return existing;
    }
    let config = APP_CONFIG.get_or_init(|| load_or_create_config(&get_config_file_path()));
    info!("[配置模块] 应用配置已成功初始化完毕。");
    config
}
