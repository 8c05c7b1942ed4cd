// RobotRelayService/src/gateway/link.rs

//! 到机器人消息网关的出站连接管理。
//!
//! 每个机器人最多一个网关连接。同一机器人的连接/断开操作由按机器人划分的异步互斥锁串行化，
//! "先拆除旧连接再建立新连接" 作为一个整体执行，并发的 `connect` 调用结束后只会剩下一个连接。
//!
//! 每个连接有自己的 `connection_id`。接收循环退出时只在自己仍是当前连接的情况下执行断开，
//! 不会误拆后来建立的新连接。

use chrono::Utc;
use common_models::ws_payloads::GatewayForwardPayload;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use rust_websocket_utils::client::transport::{
    close_sink, connect_client, is_recoverable, receive_frame, send_frame, ClientConnection, FrameSink,
    FrameStream,
};
use rust_websocket_utils::error::WsError;
use rust_websocket_utils::message::BridgeFrame;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex as TokioMutex, Notify};
use uuid::Uuid;

use super::topics::{message_type_tag, TopicHandler, TopicSpec, SUBSCRIBED_TOPICS};
use crate::config::GatewayConfig;
use crate::db::{Store, ROBOTS};
use crate::ws_server::connection_manager::ConnectionManager;

/// 发送端及其上已订阅的话题，由同一把锁保护。
struct SinkState {
    sink: FrameSink,
    subscribed: HashSet<String>,
}

/// 一个活动的网关连接。
struct GatewayConnection {
    connection_id: Uuid,
    uri: String,
    state: TokioMutex<SinkState>,
    /// 通知接收循环停止
    shutdown: Arc<Notify>,
}

impl GatewayConnection {
    async fn send(&self, frame: &BridgeFrame) -> Result<(), WsError> {
        let mut state = self.state.lock().await;
        send_frame(&mut state.sink, frame).await
    }

    /// 订阅话题；同一连接上重复订阅同一话题不会再次发送订阅帧。
    ///
    /// # 返回
    /// 实际发送了订阅帧时返回 `true`。
    async fn subscribe(&self, spec: &TopicSpec) -> Result<bool, WsError> {
        let mut state = self.state.lock().await;
        if state.subscribed.contains(spec.topic) {
            return Ok(false);
        }
        send_frame(&mut state.sink, &BridgeFrame::subscribe(spec.topic, spec.msg_type)).await?;
        state.subscribed.insert(spec.topic.to_string());
        Ok(true)
    }

    async fn close(&self) {
        self.shutdown.notify_one();
        let mut state = self.state.lock().await;
        close_sink(&mut state.sink).await;
    }
}

/// 管理所有机器人的网关连接。
pub struct GatewayLink {
    connections: DashMap<String, Arc<GatewayConnection>>,
    connect_locks: DashMap<String, Arc<TokioMutex<()>>>,
    registry: Arc<ConnectionManager>,
    store: Arc<dyn Store>,
    config: GatewayConfig,
}

impl GatewayLink {
    pub fn new(registry: Arc<ConnectionManager>, store: Arc<dyn Store>, config: GatewayConfig) -> Self {
        Self {
            connections: DashMap::new(),
            connect_locks: DashMap::new(),
            registry,
            store,
            config,
        }
    }

    /// 连接机器人的消息网关。
    ///
    /// 已有连接时先将其关闭。连接成功后订阅固定的话题集合、
    /// 将机器人记录为 "connected" 并启动接收循环。
    ///
    /// # 参数
    /// * `robot_id` - 机器人 ID。
    /// * `uri` - 网关地址，例如 `ws://192.168.0.10:9090`。
    ///
    /// # 返回
    /// 连接并订阅成功时返回 `true`；传输错误或超时返回 `false`。
    pub async fn connect(self: &Arc<Self>, robot_id: &str, uri: &str) -> bool {
        let lock = self.connect_lock(robot_id);
        let connected = {
            let _guard = lock.lock().await;
            self.connect_locked(robot_id, uri).await
        };
        self.prune_connect_lock(robot_id, &lock);
        connected
    }

    async fn connect_locked(self: &Arc<Self>, robot_id: &str, uri: &str) -> bool {
        if self.teardown_locked(robot_id).await {
            info!("[GatewayLink] 机器人 {} 的旧网关连接已关闭，准备重新连接", robot_id);
        }

        let ClientConnection { ws_sender, ws_receiver } =
            match connect_client(uri, self.config.connect_timeout()).await {
                Ok(connection) => connection,
                Err(e) => {
                    error!("[GatewayLink] 机器人 {} 连接网关 {} 失败: {}", robot_id, uri, e);
                    return false;
                }
            };

        let connection = Arc::new(GatewayConnection {
            connection_id: Uuid::new_v4(),
            uri: uri.to_string(),
            state: TokioMutex::new(SinkState {
                sink: ws_sender,
                subscribed: HashSet::new(),
            }),
            shutdown: Arc::new(Notify::new()),
        });

        for spec in SUBSCRIBED_TOPICS.iter() {
            let result = tokio::time::timeout(self.config.publish_timeout(), connection.subscribe(spec)).await;
            let failure = match result {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(WsError::SendTimeout(self.config.publish_timeout_ms).to_string()),
            };
            if let Some(reason) = failure {
                error!("[GatewayLink] 机器人 {} 订阅话题 {} 失败: {}", robot_id, spec.topic, reason);
                connection.close().await;
                return false;
            }
        }

        self.connections.insert(robot_id.to_string(), Arc::clone(&connection));
        let link = Arc::clone(self);
        let loop_robot_id = robot_id.to_string();
        let connection_id = connection.connection_id;
        let shutdown = Arc::clone(&connection.shutdown);
        tokio::spawn(async move {
            link.run_receive_loop(loop_robot_id, connection_id, ws_receiver, shutdown).await;
        });

        let mut patch = Map::new();
        patch.insert("connection_status".to_string(), json!("connected"));
        patch.insert("last_connected".to_string(), json!(Utc::now()));
        patch.insert("gateway_uri".to_string(), json!(uri));
        if let Err(e) = self.store.update(ROBOTS, robot_id, patch, true).await {
            warn!("[GatewayLink] 记录机器人 {} 的连接状态失败: {}", robot_id, e);
        }

        info!(
            "[GatewayLink] 机器人 {} 已连接网关 {} (连接 {})，已订阅 {} 个话题",
            robot_id,
            uri,
            connection_id,
            SUBSCRIBED_TOPICS.len()
        );
        true
    }

    /// 断开机器人的网关连接。没有活动连接时为空操作。
    pub async fn disconnect(&self, robot_id: &str) {
        let lock = self.connect_lock(robot_id);
        {
            let _guard = lock.lock().await;
            if self.teardown_locked(robot_id).await {
                info!("[GatewayLink] 机器人 {} 的网关连接已断开", robot_id);
            } else {
                debug!("[GatewayLink] 机器人 {} 没有活动的网关连接，断开请求被忽略", robot_id);
            }
        }
        self.prune_connect_lock(robot_id, &lock);
    }

    /// 断开全部网关连接 (进程退出时调用)。
    pub async fn disconnect_all(&self) {
        let robot_ids: Vec<String> = self.connections.iter().map(|entry| entry.key().clone()).collect();
        for robot_id in robot_ids {
            self.disconnect(&robot_id).await;
        }
    }

    /// 向机器人的网关发布一条消息。
    ///
    /// 没有活动连接时返回 `false`。发送失败或超时视为连接断开，不会自动重试。
    pub async fn publish(&self, robot_id: &str, topic: &str, msg_type: &str, msg: Value) -> bool {
        let Some(connection) = self.current_connection(robot_id) else {
            warn!("[GatewayLink] 机器人 {} 没有活动的网关连接，无法发布到 {}", robot_id, topic);
            return false;
        };

        let frame = BridgeFrame::publish(topic, msg_type, msg);
        let failure = match tokio::time::timeout(self.config.publish_timeout(), connection.send(&frame)).await {
            Ok(Ok(())) => {
                debug!("[GatewayLink] 已向机器人 {} 发布 {} ({})", robot_id, topic, msg_type);
                return true;
            }
            Ok(Err(e)) => e,
            Err(_) => WsError::SendTimeout(self.config.publish_timeout_ms),
        };

        error!("[GatewayLink] 向机器人 {} 发布 {} 失败: {}，连接将被断开", robot_id, topic, failure);
        self.disconnect_if_current(robot_id, connection.connection_id).await;
        false
    }

    pub fn is_connected(&self, robot_id: &str) -> bool {
        self.connections.contains_key(robot_id)
    }

    /// 当前连接的网关地址。
    pub fn connection_uri(&self, robot_id: &str) -> Option<String> {
        self.connections.get(robot_id).map(|entry| entry.value().uri.clone())
    }

    /// 已连接的机器人 ID，按字典序排列。
    pub fn connected_robots(&self) -> Vec<String> {
        let mut robots: Vec<String> = self.connections.iter().map(|entry| entry.key().clone()).collect();
        robots.sort();
        robots
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn current_connection(&self, robot_id: &str) -> Option<Arc<GatewayConnection>> {
        self.connections.get(robot_id).map(|entry| Arc::clone(entry.value()))
    }

    fn connect_lock(&self, robot_id: &str) -> Arc<TokioMutex<()>> {
        Arc::clone(
            self.connect_locks
                .entry(robot_id.to_string())
                .or_insert_with(|| Arc::new(TokioMutex::new(())))
                .value(),
        )
    }

    /// 机器人既没有活动连接、锁也无人持有或等待时，移除它的连接锁。
    ///
    /// 判断在 DashMap 分片写锁内完成：引用计数为 2 (映射表与调用方) 说明没有其他任务拿到这把锁。
    fn prune_connect_lock(&self, robot_id: &str, lock: &Arc<TokioMutex<()>>) {
        let pruned = self
            .connect_locks
            .remove_if(robot_id, |_, current| {
                Arc::ptr_eq(current, lock)
                    && Arc::strong_count(current) == 2
                    && !self.connections.contains_key(robot_id)
            })
            .is_some();
        if pruned {
            debug!("[GatewayLink] 已移除机器人 {} 的空闲连接锁", robot_id);
        }
    }

    #[cfg(test)]
    fn connect_lock_count(&self) -> usize {
        self.connect_locks.len()
    }

    /// 只有当 `connection_id` 仍是机器人的当前连接时才断开。
    async fn disconnect_if_current(&self, robot_id: &str, connection_id: Uuid) {
        let lock = self.connect_lock(robot_id);
        {
            let _guard = lock.lock().await;
            let is_current = self
                .connections
                .get(robot_id)
                .map(|entry| entry.value().connection_id == connection_id)
                .unwrap_or(false);
            if is_current {
                self.teardown_locked(robot_id).await;
                info!("[GatewayLink] 机器人 {} 的网关连接 {} 已断开", robot_id, connection_id);
            } else {
                debug!("[GatewayLink] 连接 {} 已不是机器人 {} 的当前连接，跳过断开", connection_id, robot_id);
            }
        }
        self.prune_connect_lock(robot_id, &lock);
    }

    /// 移除并关闭当前连接，记录 "disconnected" 状态。调用方必须持有该机器人的连接锁。
    async fn teardown_locked(&self, robot_id: &str) -> bool {
        let Some((_, connection)) = self.connections.remove(robot_id) else {
            return false;
        };
        if tokio::time::timeout(self.config.publish_timeout(), connection.close()).await.is_err() {
            warn!("[GatewayLink] 关闭机器人 {} 的网关连接超时，直接丢弃", robot_id);
        }

        let mut patch = Map::new();
        patch.insert("connection_status".to_string(), json!("disconnected"));
        patch.insert("last_disconnected".to_string(), json!(Utc::now()));
        if let Err(e) = self.store.update(ROBOTS, robot_id, patch, true).await {
            warn!("[GatewayLink] 记录机器人 {} 的断开状态失败: {}", robot_id, e);
        }
        true
    }

    /// 接收循环：按到达顺序逐帧处理，直到连接关闭、出错或被通知停止。
    async fn run_receive_loop(
        self: Arc<Self>,
        robot_id: String,
        connection_id: Uuid,
        mut ws_receiver: FrameStream,
        shutdown: Arc<Notify>,
    ) {
        info!("[GatewayLink] 机器人 {} 的接收循环已启动 (连接 {})", robot_id, connection_id);
        let connection_lost = loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.notified() => {
                    debug!("[GatewayLink] 机器人 {} 的接收循环收到停止通知", robot_id);
                    break false;
                }
                next = receive_frame(&mut ws_receiver) => next,
            };
            match next {
                Some(Ok(frame)) => self.dispatch_frame(&robot_id, frame).await,
                Some(Err(e)) if is_recoverable(&e) => {
                    warn!("[GatewayLink] 丢弃机器人 {} 的无效网关帧: {}", robot_id, e);
                }
                Some(Err(e)) => {
                    error!("[GatewayLink] 机器人 {} 的网关连接出错: {}", robot_id, e);
                    break true;
                }
                None => {
                    info!("[GatewayLink] 机器人 {} 的网关关闭了连接", robot_id);
                    break true;
                }
            }
        };

        if connection_lost {
            self.disconnect_if_current(&robot_id, connection_id).await;
        }
        info!("[GatewayLink] 机器人 {} 的接收循环已结束 (连接 {})", robot_id, connection_id);
    }

    /// 处理一条入站帧：执行话题处理器，再把转发副本广播给对应通道的订阅者。
    async fn dispatch_frame(&self, robot_id: &str, frame: BridgeFrame) {
        if !frame.is_publish() {
            debug!("[GatewayLink] 忽略机器人 {} 的非发布帧 (op={})", robot_id, frame.op);
            return;
        }
        let Some(topic) = frame.topic else {
            warn!("[GatewayLink] 机器人 {} 的发布帧缺少 topic 字段，已丢弃", robot_id);
            return;
        };
        let Some(handler) = TopicHandler::for_topic(&topic) else {
            warn!("[GatewayLink] 机器人 {} 的未知话题 {}，已丢弃", robot_id, topic);
            return;
        };

        let msg = frame.msg.unwrap_or(Value::Null);
        if let Err(e) = handler.handle(self.store.as_ref(), robot_id, &msg).await {
            warn!("[GatewayLink] 话题 {} 的处理器执行失败 (机器人 {}): {}", topic, robot_id, e);
        }

        let forward = GatewayForwardPayload {
            message_type: message_type_tag(&topic),
            robot_id: robot_id.to_string(),
            topic,
            msg,
        };
        let delivered = self.registry.broadcast(handler.forward_channel(), robot_id, &forward);
        debug!(
            "[GatewayLink] 机器人 {} 的 {} 消息已转发给 {} 个 {} 会话",
            robot_id,
            forward.message_type,
            delivered,
            handler.forward_channel()
        );
    }
}
