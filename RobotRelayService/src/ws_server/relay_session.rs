// RobotRelayService/src/ws_server/relay_session.rs

//! 遥测通道 (monitoring / sensor / camera) 的浏览器会话。
//!
//! 会话状态机：`Connecting -> Streaming -> Closing -> Closed`。
//! - Connecting: 启动发送任务，加入订阅注册表；摄像头通道还需获取设备，失败时发送 `{error}` 后直接进入 Closing。
//! - Streaming: 按通道节奏生成并推送数据帧，同时读取入站帧以感知客户端断开。
//! - Closing: 退出注册表，释放摄像头设备，等待发送任务写出 Close 帧。

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use common_models::enums::ChannelKind;
use common_models::ws_payloads::{CameraFramePayload, ErrorPayload};
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use log::{debug, info, warn};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::client_session::{ClientSession, OUTBOUND_QUEUE_CAPACITY};
use super::service::spawn_sender_task;
use super::telemetry::{cadence, SyntheticGenerator};
use crate::camera::{CameraDevice, CameraError};
use crate::db::CAMERA_LOGS;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    Connecting,
    Streaming,
    Closing,
    Closed,
}

/// 摄像头会话的采集状态。
struct CameraStream {
    device: Arc<CameraDevice>,
    frame_number: u64,
    /// 连续读帧失败次数，成功一帧后清零
    failures: u32,
}

/// 会话的数据来源。
enum PayloadSource {
    Synthetic(SyntheticGenerator),
    Camera(CameraStream),
}

/// 一次采集的结果。
enum Produced {
    Frame(String),
    /// 读帧失败但仍在重试预算内，等待 `camera.retry_delay_ms` 后重试
    Retry,
}

struct RelaySession {
    session: Arc<ClientSession>,
    state: AppState,
    phase: RelayPhase,
}

impl RelaySession {
    fn enter(&mut self, next: RelayPhase) {
        debug!(
            "[RelaySession] 会话 {} ({}/{}) 状态 {:?} -> {:?}",
            self.session.client_id, self.session.channel, self.session.robot_id, self.phase, next
        );
        self.phase = next;
    }

    /// Connecting 阶段的通道相关准备：摄像头通道获取设备，其余通道选择合成生成器。
    async fn open_source(&self) -> Result<PayloadSource, String> {
        let channel = self.session.channel;
        let robot_id = &self.session.robot_id;
        if channel == ChannelKind::Camera {
            return match self.state.cameras.acquire(robot_id).await {
                Ok(device) => Ok(PayloadSource::Camera(CameraStream {
                    device,
                    frame_number: 0,
                    failures: 0,
                })),
                Err(e) => Err(e.to_string()),
            };
        }
        SyntheticGenerator::for_channel(channel, &self.state.config.telemetry)
            .map(PayloadSource::Synthetic)
            .ok_or_else(|| format!("通道 {} 没有遥测数据源", channel))
    }

    /// 生成一帧数据。返回 `Err` 时会话以错误帧结束。
    async fn next_payload(&self, source: &mut PayloadSource) -> Result<Produced, String> {
        match source {
            PayloadSource::Synthetic(generator) => generator
                .produce(&self.session.robot_id)
                .map(Produced::Frame)
                .map_err(|e| format!("遥测数据序列化失败: {}", e)),
            PayloadSource::Camera(stream) => self.next_camera_frame(stream).await,
        }
    }

    /// 采集一帧摄像头画面。连续读帧失败在重试预算内容忍，超出后将设备标记为故障。
    async fn next_camera_frame(&self, stream: &mut CameraStream) -> Result<Produced, String> {
        let camera = &self.state.config.camera;
        let robot_id = &self.session.robot_id;
        if !stream.device.is_active() {
            return Err(CameraError::Inactive.to_string());
        }
        match stream.device.capture_jpeg_base64().await {
            Ok(image) => {
                stream.failures = 0;
                let frame_number = stream.frame_number;
                stream.frame_number += 1;
                if frame_number % camera.log_every_n_frames.max(1) == 0 {
                    self.log_camera(frame_number, "streaming").await;
                }
                let payload = CameraFramePayload {
                    robot_id: robot_id.clone(),
                    frame_number,
                    timestamp: Utc::now(),
                    image,
                    status: "streaming".to_string(),
                };
                serde_json::to_string(&payload)
                    .map(Produced::Frame)
                    .map_err(|e| format!("摄像头帧序列化失败: {}", e))
            }
            Err(CameraError::Inactive) => Err(CameraError::Inactive.to_string()),
            Err(e) => {
                stream.failures += 1;
                warn!(
                    "[RelaySession] 机器人 {} 读帧失败 ({}/{}): {}",
                    robot_id, stream.failures, camera.max_read_failures, e
                );
                if stream.failures >= camera.max_read_failures.max(1) {
                    stream.device.mark_failed();
                    self.log_camera(stream.frame_number, "error").await;
                    return Err(format!("摄像头连续 {} 次读帧失败: {}", stream.failures, e));
                }
                Ok(Produced::Retry)
            }
        }
    }

    async fn log_camera(&self, frame_number: u64, status: &str) {
        let record = json!({
            "robot_id": self.session.robot_id,
            "timestamp": Utc::now(),
            "frame_number": frame_number,
            "status": status,
        });
        if let Err(e) = self.state.store.insert(CAMERA_LOGS, record).await {
            warn!("[RelaySession] 写入摄像头日志失败: {}", e);
        }
    }

    /// 向客户端发送 `{error}` 帧；套接字已不可写时忽略。
    async fn send_error(&self, message: &str) {
        match serde_json::to_string(&ErrorPayload::new(message)) {
            Ok(text) => {
                if self.session.sender.send(text).await.is_err() {
                    debug!("[RelaySession] 会话 {} 已不可写，错误帧未发送", self.session.client_id);
                }
            }
            Err(e) => warn!("[RelaySession] 错误帧序列化失败: {}", e),
        }
    }

    /// Streaming 阶段主循环。
    ///
    /// 读帧重试的等待作为独立分支参与 `select!`，等待期间仍能感知客户端断开与关闭请求。
    async fn stream(&self, source: &mut PayloadSource, ws_receiver: &mut SplitStream<WebSocket>) {
        let Some(period) = cadence(self.session.channel, &self.state.config.telemetry) else {
            return;
        };
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let retry_delay = Duration::from_millis(self.state.config.camera.retry_delay_ms);
        let retry_timer = tokio::time::sleep(retry_delay);
        tokio::pin!(retry_timer);
        let mut retry_pending = false;
        let id = self.session.client_id;

        loop {
            let produced = tokio::select! {
                _ = self.session.closed() => {
                    info!("[RelaySession] 会话 {} 被请求关闭", id);
                    break;
                }
                inbound = ws_receiver.next() => {
                    match inbound {
                        Some(Ok(Message::Close(frame))) => {
                            info!("[RelaySession] 会话 {} 客户端关闭连接: {:?}", id, frame);
                            break;
                        }
                        None => {
                            info!("[RelaySession] 会话 {} 入站流已结束", id);
                            break;
                        }
                        Some(Err(e)) => {
                            warn!("[RelaySession] 会话 {} 读取出错: {}", id, e);
                            break;
                        }
                        Some(Ok(other)) => {
                            debug!("[RelaySession] 会话 {} 忽略入站帧: {:?}", id, other);
                            continue;
                        }
                    }
                }
                _ = ticker.tick(), if !retry_pending => self.next_payload(source).await,
                _ = &mut retry_timer, if retry_pending => {
                    retry_pending = false;
                    ticker.reset();
                    self.next_payload(source).await
                }
            };

            match produced {
                Ok(Produced::Frame(text)) => {
                    if self.session.sender.send(text).await.is_err() {
                        info!("[RelaySession] 会话 {} 发送任务已结束", id);
                        break;
                    }
                }
                Ok(Produced::Retry) => {
                    retry_timer.as_mut().reset(tokio::time::Instant::now() + retry_delay);
                    retry_pending = true;
                }
                Err(message) => {
                    warn!("[RelaySession] 会话 {} 数据源出错: {}", id, message);
                    self.send_error(&message).await;
                    break;
                }
            }
        }
    }
}

/// 运行一个遥测通道会话，直到客户端断开或数据源出错。
///
/// # 参数
/// * `socket` - 已升级的 WebSocket。
/// * `addr` - 客户端地址。
/// * `channel` - 会话的通道类型 (不应为 `Control`)。
/// * `robot_id` - 机器人 ID。
/// * `state` - 共享状态。
pub async fn run_relay_session(
    socket: WebSocket,
    addr: SocketAddr,
    channel: ChannelKind,
    robot_id: String,
    state: AppState,
) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_CAPACITY);
    let session = Arc::new(ClientSession::new(addr, channel, robot_id, tx));
    let sender_task = spawn_sender_task(ws_sender, rx, session.client_id);

    let mut relay = RelaySession {
        session: Arc::clone(&session),
        state,
        phase: RelayPhase::Connecting,
    };
    info!(
        "[RelaySession] 新会话 {}: addr={}, 通道={}, 机器人={}",
        session.client_id, addr, channel, session.robot_id
    );
    relay.state.registry.connect(Arc::clone(&session)).await;

    let mut camera_device = None;
    match relay.open_source().await {
        Ok(mut source) => {
            if let PayloadSource::Camera(stream) = &source {
                camera_device = Some(Arc::clone(&stream.device));
            }
            relay.enter(RelayPhase::Streaming);
            relay.stream(&mut source, &mut ws_receiver).await;
        }
        Err(message) => {
            warn!("[RelaySession] 会话 {} 初始化失败: {}", session.client_id, message);
            relay.send_error(&message).await;
        }
    }

    relay.enter(RelayPhase::Closing);
    relay.state.registry.disconnect(&session).await;
    if let Some(device) = camera_device {
        relay.state.cameras.release(&device).await;
    }

    // 释放全部发送端后发送任务写出 Close 帧并结束
    let client_id = session.client_id;
    drop(relay.session);
    drop(session);
    if let Err(e) = sender_task.await {
        warn!("[RelaySession] 会话 {} 的发送任务异常结束: {:?}", client_id, e);
    }
    debug!("[RelaySession] 会话 {} 状态 -> {:?}", client_id, RelayPhase::Closed);
    info!("[RelaySession] 会话 {} 已关闭", client_id);
}
