// rust_websocket_utils/src/message.rs

//! 机器人消息网关 (rosbridge 风格) 的 JSON 帧定义。
//!
//! 网关协议中的每一帧都是一个 JSON 对象，以 `op` 字段区分操作类型：
//! - 订阅：`{"op":"subscribe","topic":..,"type":..}`
//! - 发布：`{"op":"publish","topic":..,"type":..,"msg":{..}}`
//!
//! 网关还可能下发 `status`、`service_response` 等其他操作，
//! 因此 `op` 保留为字符串而不是封闭枚举，由调用方决定如何处理未知操作。

use crate::error::WsError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 订阅操作。
pub const OP_SUBSCRIBE: &str = "subscribe";
/// 发布操作 (双向：出站指令与入站话题消息都使用此操作)。
pub const OP_PUBLISH: &str = "publish";

/// 网关协议中的单个 JSON 帧。
///
/// 除 `op` 外的字段都是可选的；序列化时省略值为 `None` 的字段，
/// 使输出与网关期望的紧凑格式一致。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BridgeFrame {
    /// 操作类型，例如 `"publish"`、`"subscribe"`。
    pub op: String,
    /// 可选的请求标识，网关在相关的应答中原样带回。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// 消息类型，例如 `"geometry_msgs/msg/Twist"`。线格式中的字段名为 `type`。
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub msg_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<Value>,
}

impl BridgeFrame {
    /// 构造一个订阅帧，附带随机生成的请求标识。
    ///
    /// # 参数
    /// * `topic` - 话题路径，例如 `/robot_status`。
    /// * `msg_type` - 话题的消息类型，例如 `std_msgs/String`。
    pub fn subscribe(topic: &str, msg_type: &str) -> Self {
        Self {
            op: OP_SUBSCRIBE.to_string(),
            id: Some(format!("subscribe:{}:{}", topic, Uuid::new_v4())),
            topic: Some(topic.to_string()),
            msg_type: Some(msg_type.to_string()),
            msg: None,
        }
    }

    /// 构造一个发布帧。
    pub fn publish(topic: &str, msg_type: &str, msg: Value) -> Self {
        Self {
            op: OP_PUBLISH.to_string(),
            id: None,
            topic: Some(topic.to_string()),
            msg_type: Some(msg_type.to_string()),
            msg: Some(msg),
        }
    }

    pub fn is_publish(&self) -> bool {
        self.op == OP_PUBLISH
    }

    /// 将帧序列化为 JSON 文本。
    pub fn to_json(&self) -> Result<String, WsError> {
        serde_json::to_string(self)
            .map_err(|e| WsError::SerializationError(format!("网关帧序列化为 JSON 失败: {}", e)))
    }

    /// 从 JSON 文本解析帧。缺少 `op` 字段或不是 JSON 对象时返回反序列化错误。
    pub fn from_json(text: &str) -> Result<Self, WsError> {
        serde_json::from_str(text).map_err(|e| {
            WsError::DeserializationError(format!("网关帧解析失败: {}, 原始文本: '{}'", e, text))
        })
    }
}
