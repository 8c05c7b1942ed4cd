// RobotRelayService/src/db/mod.rs

//! 文档存储模块。
//!
//! 中继核心通过 [`Store`] trait 访问持久化层，只依赖按集合划分、以 `id` 字段为键的
//! `find` / `insert` / `update` 等简单操作，不关心具体的数据库实现。
//! 当前提供进程内实现 [`memory_store::MemoryStore`]。
//!
//! 中继核心使用的集合：
//! - `robots`: 机器人文档 (连接状态、最近状态、地图数据)。
//! - `sensor_logs`: 网关上报的传感器数据。
//! - `camera_logs`: 摄像头会话的帧记录。
//! - `websocket_logs`: 浏览器会话的连接/断开事件。

pub mod memory_store;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub const ROBOTS: &str = "robots";
pub const SENSOR_LOGS: &str = "sensor_logs";
pub const CAMERA_LOGS: &str = "camera_logs";
pub const WEBSOCKET_LOGS: &str = "websocket_logs";

/// 存储层错误。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("存储不可用: {0}")]
    Unavailable(String),

    #[error("无效的文档: {0}")]
    InvalidDocument(String),
}

/// 文档存储抽象。所有文档都是 JSON 对象，以字符串类型的 `id` 字段作为唯一键。
#[async_trait]
pub trait Store: Send + Sync {
    /// 检查存储是否可达。启动阶段调用，失败时进程拒绝启动。
    async fn ping(&self) -> Result<(), StoreError>;

    /// 按 `id` 查找单个文档。
    async fn find(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// 返回集合中字段 `field` 等于 `value` 的全部文档，按键顺序排列。
    async fn find_where(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Value>, StoreError>;

    /// 插入文档并返回其 `id`。文档未携带 `id` 时由存储生成。
    async fn insert(&self, collection: &str, document: Value) -> Result<String, StoreError>;

    /// 将 `patch` 中的字段合并进 `id` 对应的文档。
    ///
    /// 文档不存在且 `upsert` 为真时创建新文档。
    /// 返回是否有文档被修改或创建。
    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Map<String, Value>,
        upsert: bool,
    ) -> Result<bool, StoreError>;
}
