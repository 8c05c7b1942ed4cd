//! 网关话题与处理器。
//!
//! 订阅的话题集合是固定的，每个话题对应一个 [`TopicHandler`] 变体，
//! 由 `match` 统一分派。

use chrono::Utc;
use common_models::enums::ChannelKind;
use serde_json::{json, Map, Value};

use crate::db::{Store, StoreError, ROBOTS, SENSOR_LOGS};

/// 已订阅话题的处理器。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicHandler {
    /// 机器人状态：写入机器人文档的 `status` 字段。
    RobotStatus,
    /// 传感器数据：追加到 `sensor_logs`。
    SensorData,
    /// 摄像头画面：由摄像头通道负责，这里只转发不落库。
    CameraFeed,
    /// 地图数据：合并进机器人文档。
    MapData,
}

/// 一个订阅项：话题、消息类型与处理器。
#[derive(Debug, Clone, Copy)]
pub struct TopicSpec {
    pub topic: &'static str,
    pub msg_type: &'static str,
    pub handler: TopicHandler,
}

/// 每个网关连接建立后订阅的话题。
pub const SUBSCRIBED_TOPICS: [TopicSpec; 4] = [
    TopicSpec { topic: "/robot_status", msg_type: "std_msgs/String", handler: TopicHandler::RobotStatus },
    TopicSpec { topic: "/sensor_data", msg_type: "sensor_msgs/JointState", handler: TopicHandler::SensorData },
    TopicSpec { topic: "/camera_feed", msg_type: "sensor_msgs/Image", handler: TopicHandler::CameraFeed },
    TopicSpec { topic: "/map_data", msg_type: "nav_msgs/OccupancyGrid", handler: TopicHandler::MapData },
];

impl TopicHandler {
    pub fn for_topic(topic: &str) -> Option<Self> {
        SUBSCRIBED_TOPICS
            .iter()
            .find(|spec| spec.topic == topic)
            .map(|spec| spec.handler)
    }

    /// 该话题的消息转发到哪个浏览器通道。
    pub fn forward_channel(&self) -> ChannelKind {
        match self {
            TopicHandler::RobotStatus | TopicHandler::MapData => ChannelKind::Monitoring,
            TopicHandler::SensorData => ChannelKind::Sensor,
            TopicHandler::CameraFeed => ChannelKind::Camera,
        }
    }

    /// 执行话题的持久化副作用。
    pub async fn handle(&self, store: &dyn Store, robot_id: &str, msg: &Value) -> Result<(), StoreError> {
        let now = Utc::now();
        match self {
            TopicHandler::RobotStatus => {
                let mut patch = Map::new();
                patch.insert("status".to_string(), msg.clone());
                patch.insert("last_updated".to_string(), json!(now));
                store.update(ROBOTS, robot_id, patch, true).await?;
            }
            TopicHandler::SensorData => {
                store
                    .insert(
                        SENSOR_LOGS,
                        json!({ "robot_id": robot_id, "timestamp": now, "data": msg }),
                    )
                    .await?;
            }
            TopicHandler::CameraFeed => {}
            TopicHandler::MapData => {
                let mut patch = Map::new();
                patch.insert("map_data".to_string(), msg.clone());
                patch.insert("map_updated".to_string(), json!(now));
                store.update(ROBOTS, robot_id, patch, true).await?;
            }
        }
        Ok(())
    }
}

/// 话题路径扁平化为消息类型标签：去掉首尾的 `/`，其余 `/` 替换为 `_`。
pub fn message_type_tag(topic: &str) -> String {
    topic.trim_matches('/').replace('/', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_store::MemoryStore;

    #[test]
    fn topic_paths_flatten_to_tags() {
        assert_eq!(message_type_tag("/robot_status"), "robot_status");
        assert_eq!(message_type_tag("/robot_1/map_data"), "robot_1_map_data");
        assert_eq!(message_type_tag("plain"), "plain");
        assert_eq!(message_type_tag("/a/b/"), "a_b");
    }

    #[test]
    fn every_subscribed_topic_resolves() {
        for spec in SUBSCRIBED_TOPICS {
            assert_eq!(TopicHandler::for_topic(spec.topic), Some(spec.handler));
        }
        assert_eq!(TopicHandler::for_topic("/unknown"), None);
        assert_eq!(TopicHandler::MapData.forward_channel(), ChannelKind::Monitoring);
        assert_eq!(TopicHandler::CameraFeed.forward_channel(), ChannelKind::Camera);
    }

    #[tokio::test]
    async fn handlers_persist_by_topic() {
        let store = MemoryStore::default();
        TopicHandler::RobotStatus
            .handle(&store, "R1", &json!({"data": "charging"}))
            .await
            .unwrap();
        TopicHandler::MapData
            .handle(&store, "R1", &json!({"width": 2, "data": [0, 100]}))
            .await
            .unwrap();
        TopicHandler::SensorData
            .handle(&store, "R1", &json!({"position": [0.1, 0.2]}))
            .await
            .unwrap();
        TopicHandler::CameraFeed.handle(&store, "R1", &json!({"data": "..."})).await.unwrap();

        let robot = store.find(ROBOTS, "R1").await.unwrap().unwrap();
        assert_eq!(robot["status"], json!({"data": "charging"}));
        assert_eq!(robot["map_data"]["width"], 2);
        assert!(robot["map_updated"].is_string());
        assert_eq!(store.len(SENSOR_LOGS), 1);
    }
}
