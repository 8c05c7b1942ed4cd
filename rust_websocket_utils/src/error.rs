// rust_websocket_utils/src/error.rs

//! 定义 WebSocket 工具库相关的错误类型。

use thiserror::Error;

/// WebSocket 工具库的统一错误类型。
#[derive(Error, Debug)]
pub enum WsError {
    /// 当 serde 序列化失败时返回。
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 当 serde 反序列化失败时返回，包含原始文本以便排查。
    #[error("反序列化错误: {0}")]
    DeserializationError(String),

    /// WebSocket 协议相关的错误，例如握手失败、连接被重置。
    #[error("WebSocket协议错误: {0}")]
    WebSocketProtocolError(#[from] tokio_tungstenite::tungstenite::Error),

    /// 连接超时错误。
    #[error("连接超时 ({0} 毫秒)")]
    ConnectionTimeout(u64),

    /// 发送在限定时间内未完成。
    #[error("发送超时 ({0} 毫秒)")]
    SendTimeout(u64),

    /// 无效的 URL 格式或不支持的 scheme。
    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    /// 未连接错误，当尝试在未建立连接时进行操作。
    #[error("未连接")]
    NotConnected,

    /// 对端已关闭连接。
    #[error("连接已关闭")]
    ConnectionClosed,

    /// 收到了非预期的帧类型 (例如二进制帧)。
    #[error("消息错误: {0}")]
    Message(String),
}
