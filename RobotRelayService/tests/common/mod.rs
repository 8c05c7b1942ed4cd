// RobotRelayService/tests/common/mod.rs

//! 集成测试共用的辅助设施：模拟机器人网关、测试配置、中继服务启动与浏览器客户端。

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use log::{info, warn, LevelFilter};
use robot_relay_service::camera::CameraProvider;
use robot_relay_service::config::AppConfig;
use robot_relay_service::db::memory_store::MemoryStore;
use robot_relay_service::state::AppState;
use robot_relay_service::ws_server::service::WsService;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::protocol::Message as TungsteniteMessage;
use tokio_tungstenite::{accept_async, connect_async, MaybeTlsStream, WebSocketStream};

pub type BrowserClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 推送给所有连接的关闭指令
const CLOSE_COMMAND: &str = "__close__";

// 辅助函数：初始化日志，仅用于测试，避免多次初始化
pub fn init_test_logger() {
    let _ = env_logger::builder().filter_level(LevelFilter::Debug).is_test(true).try_init();
}

/// 间隔很短的测试配置，使会话能在几百毫秒内产生数据。
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.gateway.connect_timeout_ms = 1_000;
    config.gateway.publish_timeout_ms = 1_000;
    config.telemetry.monitoring_interval_ms = 100;
    config.telemetry.sensor_interval_ms = 50;
    config.telemetry.camera_interval_ms = 20;
    config.telemetry.lidar_point_count = 36;
    config.camera.width = 64;
    config.camera.height = 48;
    config.camera.retry_delay_ms = 20;
    config.camera.max_read_failures = 3;
    config.camera.log_every_n_frames = 5;
    config
}

pub fn test_state(config: AppConfig) -> AppState {
    AppState::new(config, Arc::new(MemoryStore::default()))
}

/// 在随机端口上启动中继服务，返回监听地址。服务随测试运行时一起结束。
pub async fn spawn_relay(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("无法绑定到随机端口");
    let addr = listener.local_addr().expect("无法获取本地监听地址");
    let service = WsService::new(state);
    tokio::spawn(async move {
        if let Err(e) = service.serve(listener, std::future::pending()).await {
            warn!("[Test Relay] 服务异常结束: {}", e);
        }
    });
    info!("[Test Relay] 中继服务监听于 {}", addr);
    addr
}

pub async fn spawn_relay_with_camera(config: AppConfig, provider: Arc<dyn CameraProvider>) -> (SocketAddr, AppState) {
    let state = AppState::with_camera_provider(config, Arc::new(MemoryStore::default()), provider);
    let addr = spawn_relay(state.clone()).await;
    (addr, state)
}

/// 以浏览器身份连接 `/ws/{channel}/{robot_id}`。
pub async fn open_browser(addr: SocketAddr, channel: &str, robot_id: &str) -> BrowserClient {
    let url = format!("ws://{}/ws/{}/{}", addr, channel, robot_id);
    let (client, _) = connect_async(url.as_str()).await.expect("浏览器客户端连接失败");
    client
}

/// 读取下一条文本帧并解析为 JSON；超时或连接关闭时返回 `None`。
pub async fn next_json(client: &mut BrowserClient, within: Duration) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let message = tokio::time::timeout(remaining, client.next()).await.ok()??;
        match message {
            Ok(TungsteniteMessage::Text(text)) => return serde_json::from_str(&text).ok(),
            Ok(TungsteniteMessage::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

pub async fn send_json(client: &mut BrowserClient, value: &Value) {
    client
        .send(TungsteniteMessage::Text(value.to_string()))
        .await
        .expect("浏览器客户端发送失败");
}

/// 轮询条件直到成立或超时。
pub async fn wait_until<F>(within: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// 模拟的机器人消息网关：记录收到的全部帧，可以向所有连接推送帧或关闭连接。
pub struct FakeGateway {
    pub addr: SocketAddr,
    frames: Arc<Mutex<Vec<Value>>>,
    live: Arc<AtomicUsize>,
    accepted: Arc<AtomicUsize>,
    outbound: broadcast::Sender<String>,
}

impl FakeGateway {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("无法绑定到随机端口");
        let addr = listener.local_addr().expect("无法获取本地监听地址");
        let frames = Arc::new(Mutex::new(Vec::new()));
        let live = Arc::new(AtomicUsize::new(0));
        let accepted = Arc::new(AtomicUsize::new(0));
        let (outbound, _) = broadcast::channel::<String>(64);

        let gateway = Self {
            addr,
            frames: Arc::clone(&frames),
            live: Arc::clone(&live),
            accepted: Arc::clone(&accepted),
            outbound: outbound.clone(),
        };

        tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                let frames = Arc::clone(&frames);
                let live = Arc::clone(&live);
                let accepted = Arc::clone(&accepted);
                let mut push_rx = outbound.subscribe();
                tokio::spawn(async move {
                    let ws = match accept_async(stream).await {
                        Ok(ws) => ws,
                        Err(e) => {
                            warn!("[Test Gateway] 与 {} 握手失败: {}", peer, e);
                            return;
                        }
                    };
                    accepted.fetch_add(1, Ordering::SeqCst);
                    live.fetch_add(1, Ordering::SeqCst);
                    info!("[Test Gateway] 接受来自 {} 的连接", peer);
                    let (mut write, mut read) = ws.split();
                    loop {
                        tokio::select! {
                            incoming = read.next() => match incoming {
                                Some(Ok(TungsteniteMessage::Text(text))) => {
                                    match serde_json::from_str::<Value>(&text) {
                                        Ok(value) => frames.lock().unwrap().push(value),
                                        Err(e) => warn!("[Test Gateway] 收到无法解析的帧: {} ({})", text, e),
                                    }
                                }
                                Some(Ok(TungsteniteMessage::Close(_))) | None | Some(Err(_)) => break,
                                Some(Ok(_)) => {}
                            },
                            pushed = push_rx.recv() => match pushed {
                                Ok(text) if text == CLOSE_COMMAND => {
                                    let _ = write.send(TungsteniteMessage::Close(None)).await;
                                    break;
                                }
                                Ok(text) => {
                                    if write.send(TungsteniteMessage::Text(text)).await.is_err() {
                                        break;
                                    }
                                }
                                Err(_) => {}
                            },
                        }
                    }
                    live.fetch_sub(1, Ordering::SeqCst);
                    info!("[Test Gateway] 与 {} 的连接已结束", peer);
                });
            }
        });
        gateway
    }

    pub fn uri(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn frames(&self) -> Vec<Value> {
        self.frames.lock().unwrap().clone()
    }

    pub fn frames_with_op(&self, op: &str) -> Vec<Value> {
        self.frames().into_iter().filter(|frame| frame["op"] == op).collect()
    }

    pub fn publishes_to(&self, topic: &str) -> Vec<Value> {
        self.frames_with_op("publish")
            .into_iter()
            .filter(|frame| frame["topic"] == topic)
            .collect()
    }

    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn accepted_connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// 向所有当前连接推送一条原始文本帧。
    pub fn push_raw(&self, text: &str) {
        let _ = self.outbound.send(text.to_string());
    }

    pub fn push(&self, frame: &Value) {
        self.push_raw(&frame.to_string());
    }

    /// 从网关一侧关闭所有连接。
    pub fn close_all(&self) {
        self.push_raw(CLOSE_COMMAND);
    }
}

/// 完成握手后不再读取任何数据的网关，用于制造发送端背压。
pub struct StalledGateway {
    addr: SocketAddr,
}

impl StalledGateway {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("无法绑定到随机端口");
        let addr = listener.local_addr().expect("无法获取本地监听地址");
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, peer)) = listener.accept().await {
                match accept_async(stream).await {
                    Ok(ws) => {
                        info!("[Test Gateway] 接受来自 {} 的连接，之后不再读取", peer);
                        held.push(ws);
                    }
                    Err(e) => warn!("[Test Gateway] 与 {} 握手失败: {}", peer, e),
                }
            }
        });
        Self { addr }
    }

    pub fn uri(&self) -> String {
        format!("ws://{}", self.addr)
    }
}
