// RobotRelayService/src/camera/mod.rs

//! 摄像头设备管理。
//!
//! 每个机器人最多持有一个采集设备句柄。设备在该机器人的第一个摄像头会话开始时打开，
//! 由所有摄像头会话共享 (引用计数)，最后一个会话结束时关闭。
//! "检查设备是否存在，不存在则打开" 在该机器人的设备槽位锁内完成，
//! 并发开始的会话不会为同一机器人打开两个设备；不同机器人的槽位互不阻塞。
//!
//! 采集与 JPEG 编码是阻塞操作，通过 `spawn_blocking` 在阻塞线程池中执行。

mod synthetic;

pub use synthetic::{DisabledCameraProvider, SyntheticCameraProvider};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use dashmap::DashMap;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::Mutex as TokioMutex;

use crate::config::{CameraBackend, CameraConfig};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("没有可用的摄像头设备: {0}")]
    NoDevice(String),

    #[error("读取帧失败: {0}")]
    ReadFailed(String),

    #[error("帧编码失败: {0}")]
    EncodeFailed(String),

    #[error("摄像头设备已停止")]
    Inactive,
}

/// 一帧 RGB8 图像，按行存储，每像素 3 字节。
#[derive(Debug, Clone)]
pub struct RgbFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// 一个已打开的采集设备。
pub trait FrameSource: Send {
    /// 读取一帧 (阻塞)。
    fn read_frame(&mut self) -> Result<RgbFrame, CameraError>;

    /// 设备是否仍在工作，返回 `false` 时摄像头会话结束。
    fn is_active(&self) -> bool {
        true
    }
}

/// 按机器人打开采集设备。
pub trait CameraProvider: Send + Sync {
    fn open(&self, robot_id: &str) -> Result<Box<dyn FrameSource>, CameraError>;
}

/// 按配置选择摄像头后端。
pub fn provider_from_config(config: &CameraConfig) -> Arc<dyn CameraProvider> {
    match config.backend {
        CameraBackend::Synthetic => Arc::new(SyntheticCameraProvider::new(config.width, config.height)),
        CameraBackend::Disabled => Arc::new(DisabledCameraProvider),
    }
}

/// 共享的采集设备句柄。
pub struct CameraDevice {
    robot_id: String,
    source: Mutex<Box<dyn FrameSource>>,
    jpeg_quality: u8,
    active: AtomicBool,
    /// 最近一次读帧后 `FrameSource::is_active` 的结果，查询时不必获取设备锁
    source_active: AtomicBool,
}

impl CameraDevice {
    pub fn robot_id(&self) -> &str {
        &self.robot_id
    }

    /// 设备是否仍可用。只读取原子标志，可在异步任务中直接调用。
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && self.source_active.load(Ordering::SeqCst)
    }

    /// 将设备标记为故障，共享此设备的其他会话随后也会结束。
    pub fn mark_failed(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// 采集一帧并编码为 base64 JPEG。
    pub async fn capture_jpeg_base64(self: &Arc<Self>) -> Result<String, CameraError> {
        let device = Arc::clone(self);
        tokio::task::spawn_blocking(move || device.capture_blocking())
            .await
            .map_err(|e| CameraError::ReadFailed(format!("采集任务异常结束: {}", e)))?
    }

    fn capture_blocking(&self) -> Result<String, CameraError> {
        if !self.active.load(Ordering::SeqCst) {
            return Err(CameraError::Inactive);
        }
        let frame = {
            let mut source = self
                .source
                .lock()
                .map_err(|_| CameraError::ReadFailed("设备锁已中毒".to_string()))?;
            let frame = source.read_frame();
            self.source_active.store(source.is_active(), Ordering::SeqCst);
            frame?
        };
        let jpeg = encode_jpeg(&frame, self.jpeg_quality)?;
        Ok(BASE64.encode(jpeg))
    }
}

/// 将 RGB 帧编码为 JPEG。
pub fn encode_jpeg(frame: &RgbFrame, quality: u8) -> Result<Vec<u8>, CameraError> {
    let expected = frame.width as usize * frame.height as usize * 3;
    if frame.pixels.len() != expected {
        return Err(CameraError::EncodeFailed(format!(
            "像素数据长度 {} 与尺寸 {}x{} 不符",
            frame.pixels.len(),
            frame.width,
            frame.height
        )));
    }
    let mut buffer = Vec::with_capacity(expected / 8);
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    encoder
        .encode(&frame.pixels, frame.width, frame.height, ColorType::Rgb8)
        .map_err(|e| CameraError::EncodeFailed(e.to_string()))?;
    Ok(buffer)
}

/// `/api/camera/status` 的探测结果。
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CameraProbe {
    pub robot_id: String,
    pub available: bool,
    pub in_use: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct DeviceEntry {
    device: Arc<CameraDevice>,
    sessions: usize,
}

/// 一个机器人的设备槽位；`None` 表示当前没有打开的设备。
type DeviceSlot = Arc<TokioMutex<Option<DeviceEntry>>>;

/// 按机器人管理摄像头设备的打开、共享与释放。
pub struct CameraManager {
    provider: Arc<dyn CameraProvider>,
    jpeg_quality: u8,
    devices: DashMap<String, DeviceSlot>,
}

impl CameraManager {
    pub fn new(provider: Arc<dyn CameraProvider>, jpeg_quality: u8) -> Self {
        Self {
            provider,
            jpeg_quality,
            devices: DashMap::new(),
        }
    }

    fn slot(&self, robot_id: &str) -> DeviceSlot {
        Arc::clone(
            self.devices
                .entry(robot_id.to_string())
                .or_insert_with(|| Arc::new(TokioMutex::new(None)))
                .value(),
        )
    }

    fn existing_slot(&self, robot_id: &str) -> Option<DeviceSlot> {
        self.devices.get(robot_id).map(|entry| Arc::clone(entry.value()))
    }

    /// 槽位为空且除调用方外无人持有时，从表中移除。
    ///
    /// 判断在 DashMap 分片写锁内进行，期间其他任务无法再取得该槽位。
    fn prune_slot(&self, robot_id: &str, slot: &DeviceSlot) {
        self.devices.remove_if(robot_id, |_, current| {
            Arc::ptr_eq(current, slot)
                && Arc::strong_count(current) == 2
                && current.try_lock().map(|entry| entry.is_none()).unwrap_or(false)
        });
    }

    /// 为一个摄像头会话获取机器人的设备，必要时打开设备。
    ///
    /// 已有设备处于故障状态时会重新打开并替换。
    /// 打开失败时不会留下任何设备记录。
    pub async fn acquire(&self, robot_id: &str) -> Result<Arc<CameraDevice>, CameraError> {
        let slot = self.slot(robot_id);
        let result = self.acquire_in_slot(robot_id, &slot).await;
        if result.is_err() {
            self.prune_slot(robot_id, &slot);
        }
        result
    }

    async fn acquire_in_slot(&self, robot_id: &str, slot: &DeviceSlot) -> Result<Arc<CameraDevice>, CameraError> {
        let mut current = slot.lock().await;
        if let Some(entry) = current.as_mut() {
            if entry.device.is_active() {
                entry.sessions += 1;
                debug!("[CameraManager] 复用机器人 {} 的摄像头设备，会话数={}", robot_id, entry.sessions);
                return Ok(Arc::clone(&entry.device));
            }
            warn!("[CameraManager] 机器人 {} 的摄像头设备已停止，重新打开", robot_id);
        }

        let provider = Arc::clone(&self.provider);
        let id = robot_id.to_string();
        let source = tokio::task::spawn_blocking(move || provider.open(&id))
            .await
            .map_err(|e| CameraError::NoDevice(format!("打开设备的任务异常结束: {}", e)))??;

        let device = Arc::new(CameraDevice {
            robot_id: robot_id.to_string(),
            source: Mutex::new(source),
            jpeg_quality: self.jpeg_quality,
            active: AtomicBool::new(true),
            source_active: AtomicBool::new(true),
        });
        *current = Some(DeviceEntry { device: Arc::clone(&device), sessions: 1 });
        info!("[CameraManager] 已为机器人 {} 打开摄像头设备", robot_id);
        Ok(device)
    }

    /// 一个摄像头会话结束时释放其持有的设备；最后一个会话释放时关闭设备。
    ///
    /// 只对仍登记在管理器中的同一设备生效，已被替换的旧设备直接丢弃。
    pub async fn release(&self, device: &Arc<CameraDevice>) {
        let robot_id = device.robot_id();
        let Some(slot) = self.existing_slot(robot_id) else {
            return;
        };
        {
            let mut current = slot.lock().await;
            let Some(entry) = current.as_mut() else {
                return;
            };
            if !Arc::ptr_eq(&entry.device, device) {
                debug!("[CameraManager] 机器人 {} 的旧设备句柄已被替换，忽略释放", robot_id);
                return;
            }
            entry.sessions = entry.sessions.saturating_sub(1);
            if entry.sessions > 0 {
                debug!("[CameraManager] 机器人 {} 的摄像头会话数={}", robot_id, entry.sessions);
                return;
            }
            if let Some(entry) = current.take() {
                entry.device.mark_failed();
            }
            info!("[CameraManager] 机器人 {} 的最后一个摄像头会话已结束，设备已释放", robot_id);
        }
        self.prune_slot(robot_id, &slot);
    }

    pub async fn is_open(&self, robot_id: &str) -> bool {
        match self.existing_slot(robot_id) {
            Some(slot) => slot.lock().await.is_some(),
            None => false,
        }
    }

    pub async fn session_count(&self, robot_id: &str) -> usize {
        match self.existing_slot(robot_id) {
            Some(slot) => slot.lock().await.as_ref().map(|entry| entry.sessions).unwrap_or(0),
            None => 0,
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.devices.len()
    }

    /// 探测机器人的摄像头是否可用。设备正在推流时不再重复打开。
    pub async fn probe(&self, robot_id: &str) -> CameraProbe {
        if self.is_open(robot_id).await {
            return CameraProbe {
                robot_id: robot_id.to_string(),
                available: true,
                in_use: true,
                width: None,
                height: None,
                error: None,
            };
        }

        let provider = Arc::clone(&self.provider);
        let id = robot_id.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let mut source = provider.open(&id)?;
            source.read_frame()
        })
        .await
        .map_err(|e| CameraError::ReadFailed(format!("探测任务异常结束: {}", e)))
        .and_then(|frame| frame);

        match result {
            Ok(frame) => CameraProbe {
                robot_id: robot_id.to_string(),
                available: true,
                in_use: false,
                width: Some(frame.width),
                height: Some(frame.height),
                error: None,
            },
            Err(e) => CameraProbe {
                robot_id: robot_id.to_string(),
                available: false,
                in_use: false,
                width: None,
                height: None,
                error: Some(e.to_string()),
            },
        }
    }
}
