// RobotRelayService/src/ws_server/connection_manager.rs

//! 浏览器会话的订阅注册表。
//!
//! 按 (通道类型, 机器人 ID) 将会话分桶管理。网关接收循环通过 [`ConnectionManager::broadcast`]
//! 把机器人消息扇出到对应分桶中的所有会话。
//!
//! 广播在持有分桶写锁 (DashMap 分片锁) 的情况下逐个投递，
//! 因此 `disconnect` 返回之后，该会话不会再收到任何广播。

use chrono::Utc;
use common_models::enums::ChannelKind;
use dashmap::DashMap;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::db::{Store, WEBSOCKET_LOGS};
use crate::ws_server::client_session::ClientSession;

type BucketKey = (ChannelKind, String);

/// 管理所有活动的浏览器会话分桶
pub struct ConnectionManager {
    /// Key: (通道类型, 机器人 ID)
    /// Value: 当前处于打开状态的会话；分桶变空时整体移除
    buckets: DashMap<BucketKey, Vec<Arc<ClientSession>>>,
    store: Arc<dyn Store>,
}

impl ConnectionManager {
    /// 创建一个新的 ConnectionManager 实例
    ///
    /// # 参数
    /// * `store` - 用于记录连接事件的文档存储。
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            buckets: DashMap::new(),
            store,
        }
    }

    /// 将会话加入其 (通道类型, 机器人 ID) 分桶，分桶不存在时创建，并记录连接事件。
    pub async fn connect(&self, session: Arc<ClientSession>) {
        let key = (session.channel, session.robot_id.clone());
        let client_id = session.client_id;
        let addr = session.addr;
        let bucket_size = {
            let mut bucket = self.buckets.entry(key).or_default();
            bucket.push(Arc::clone(&session));
            bucket.len()
        };
        info!(
            "[ConnectionManager] 会话加入: id={}, addr={}, 通道={}, 机器人={}, 分桶大小={}",
            client_id, addr, session.channel, session.robot_id, bucket_size
        );
        self.log_event(&session, "connected").await;
    }

    /// 将会话移出其分桶；分桶变空时一并移除。
    ///
    /// # 返回
    /// 会话原本在分桶中时返回 `true`。
    pub async fn disconnect(&self, session: &ClientSession) -> bool {
        let key = (session.channel, session.robot_id.clone());
        let removed = self.remove_member(&key, session.client_id);
        if removed {
            info!(
                "[ConnectionManager] 会话离开: id={}, 通道={}, 机器人={}",
                session.client_id, session.channel, session.robot_id
            );
            self.log_event(session, "disconnected").await;
        } else {
            debug!(
                "[ConnectionManager] 会话 {} 已不在分桶中 (可能已因广播失败被移除)",
                session.client_id
            );
        }
        removed
    }

    /// 向分桶中的每个会话投递一条消息。
    ///
    /// 投递失败 (队列已关闭或已满) 的会话会被移出分桶并被请求关闭，
    /// 其余会话的投递不受影响。
    ///
    /// # 返回
    /// 成功投递的会话数。
    pub fn broadcast<T: Serialize>(&self, channel: ChannelKind, robot_id: &str, message: &T) -> usize {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                warn!("[ConnectionManager] 广播消息序列化失败 (通道={}, 机器人={}): {}", channel, robot_id, e);
                return 0;
            }
        };

        let key = (channel, robot_id.to_string());
        let mut delivered = 0;
        let now_empty = match self.buckets.get_mut(&key) {
            Some(mut bucket) => {
                bucket.retain(|member| match member.sender.try_send(text.clone()) {
                    Ok(()) => {
                        delivered += 1;
                        true
                    }
                    Err(TrySendError::Full(_)) => {
                        warn!(
                            "[ConnectionManager] 会话 {} 出站队列已满，移出分桶 ({}/{})",
                            member.client_id, channel, robot_id
                        );
                        member.request_close();
                        false
                    }
                    Err(TrySendError::Closed(_)) => {
                        warn!(
                            "[ConnectionManager] 会话 {} 出站队列已关闭，移出分桶 ({}/{})",
                            member.client_id, channel, robot_id
                        );
                        member.request_close();
                        false
                    }
                });
                bucket.is_empty()
            }
            None => {
                debug!("[ConnectionManager] 分桶 {}/{} 无订阅者，广播被忽略", channel, robot_id);
                return 0;
            }
        };
        if now_empty {
            self.buckets.remove_if(&key, |_, members| members.is_empty());
        }
        delivered
    }

    /// 各分桶当前大小的快照：`{通道: {机器人: 会话数}}`。
    pub fn status(&self) -> BTreeMap<String, BTreeMap<String, usize>> {
        let mut snapshot: BTreeMap<String, BTreeMap<String, usize>> = ChannelKind::ALL
            .iter()
            .map(|kind| (kind.to_string(), BTreeMap::new()))
            .collect();
        for entry in self.buckets.iter() {
            let ((kind, robot_id), members) = (entry.key(), entry.value());
            snapshot
                .entry(kind.to_string())
                .or_default()
                .insert(robot_id.clone(), members.len());
        }
        snapshot
    }

    /// 指定分桶的大小；分桶不存在时为 0。
    pub fn bucket_size(&self, channel: ChannelKind, robot_id: &str) -> usize {
        self.buckets
            .get(&(channel, robot_id.to_string()))
            .map(|bucket| bucket.len())
            .unwrap_or(0)
    }

    pub fn has_bucket(&self, channel: ChannelKind, robot_id: &str) -> bool {
        self.buckets.contains_key(&(channel, robot_id.to_string()))
    }

    /// 所有分桶中的会话总数。
    pub fn total_sessions(&self) -> usize {
        self.buckets.iter().map(|entry| entry.value().len()).sum()
    }

    fn remove_member(&self, key: &BucketKey, client_id: Uuid) -> bool {
        let (removed, now_empty) = match self.buckets.get_mut(key) {
            Some(mut bucket) => {
                let before = bucket.len();
                bucket.retain(|member| member.client_id != client_id);
                (bucket.len() != before, bucket.is_empty())
            }
            None => return false,
        };
        if now_empty {
            self.buckets.remove_if(key, |_, members| members.is_empty());
        }
        removed
    }

    async fn log_event(&self, session: &ClientSession, event_type: &str) {
        let event = json!({
            "connection_type": session.channel,
            "robot_id": session.robot_id,
            "timestamp": Utc::now(),
            "event_type": event_type,
            "data": {
                "client_id": session.client_id,
                "addr": session.addr.to_string(),
                "session_started": session.creation_time,
            }
        });
        if let Err(e) = self.store.insert(WEBSOCKET_LOGS, event).await {
            warn!("[ConnectionManager] 记录连接事件失败 ({}): {}", event_type, e);
        }
    }
}
