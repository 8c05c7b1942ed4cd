// rust_websocket_utils/src/client/transport.rs

//! 出站 WebSocket 客户端传输层。
//!
//! 负责建立到机器人消息网关的连接，并在拆分后的发送端/接收端上
//! 收发 [`BridgeFrame`]。Ping/Pong 等控制帧由底层库处理，这里直接跳过。

use crate::error::WsError;
use crate::message::BridgeFrame;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use log::{debug, error, info};
use std::time::Duration;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    tungstenite::Error as TungsteniteError,
    MaybeTlsStream, WebSocketStream,
};
use url::Url;

/// 客户端 WebSocket 流类型 (可能经过 TLS)。
pub type ClientWsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
/// 拆分后的发送端。
pub type FrameSink = SplitSink<ClientWsStream, Message>;
/// 拆分后的接收端。
pub type FrameStream = SplitStream<ClientWsStream>;

/// 一个已建立的网关连接，发送端与接收端已拆分，便于交给不同任务持有。
pub struct ClientConnection {
    pub ws_sender: FrameSink,
    pub ws_receiver: FrameStream,
}

/// 连接到指定的 WebSocket 地址。
///
/// # 参数
/// * `url_str` - 网关地址，只接受 `ws://` 与 `wss://`。
/// * `connect_timeout` - 握手的最长等待时间，超时返回 [`WsError::ConnectionTimeout`]。
///
/// # 返回
/// 成功时返回拆分好的 [`ClientConnection`]。
pub async fn connect_client(url_str: &str, connect_timeout: Duration) -> Result<ClientConnection, WsError> {
    info!("[WsClient] 开始连接 WebSocket 服务器: {}", url_str);
    let parsed_url = Url::parse(url_str)
        .map_err(|e| WsError::InvalidUrl(format!("无效的 WebSocket URL '{}': {}", url_str, e)))?;
    if !matches!(parsed_url.scheme(), "ws" | "wss") {
        return Err(WsError::InvalidUrl(format!(
            "不支持的 scheme '{}' (仅支持 ws/wss): {}",
            parsed_url.scheme(),
            url_str
        )));
    }

    match tokio::time::timeout(connect_timeout, connect_async(parsed_url.as_str())).await {
        Ok(Ok((ws_stream, response))) => {
            info!("[WsClient] 已连接到 {} (HTTP 状态码: {})", url_str, response.status());
            let (ws_sender, ws_receiver) = ws_stream.split();
            Ok(ClientConnection { ws_sender, ws_receiver })
        }
        Ok(Err(e)) => {
            error!("[WsClient] 连接到 {} 失败: {}", url_str, e);
            Err(WsError::WebSocketProtocolError(e))
        }
        Err(_) => {
            let millis = connect_timeout.as_millis() as u64;
            error!("[WsClient] 连接到 {} 超时 ({} 毫秒)", url_str, millis);
            Err(WsError::ConnectionTimeout(millis))
        }
    }
}

/// 序列化并发送一帧。
pub async fn send_frame(ws_sender: &mut FrameSink, frame: &BridgeFrame) -> Result<(), WsError> {
    let text = frame.to_json()?;
    debug!("[WsClient] 发送帧: {}", text);
    ws_sender.send(Message::Text(text)).await?;
    Ok(())
}

/// 发送 Close 帧并关闭发送端，忽略对端已经断开的情况。
pub async fn close_sink(ws_sender: &mut FrameSink) {
    match ws_sender.close().await {
        Ok(()) => debug!("[WsClient] 发送端已关闭"),
        Err(TungsteniteError::ConnectionClosed) | Err(TungsteniteError::AlreadyClosed) => {}
        Err(e) => debug!("[WsClient] 关闭发送端时出错 (已忽略): {}", e),
    }
}

/// 接收下一帧。
///
/// # 返回
/// - `Some(Ok(frame))`: 成功解析的一帧。
/// - `Some(Err(WsError::DeserializationError))`: 文本帧无法解析，连接仍可继续使用。
/// - `Some(Err(..))`: 其他传输错误，连接应视为已断开。
/// - `None`: 对端正常关闭或流已结束。
pub async fn receive_frame(ws_receiver: &mut FrameStream) -> Option<Result<BridgeFrame, WsError>> {
    loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!("[WsClient] 收到文本帧: '{}'", text);
                break Some(BridgeFrame::from_json(&text));
            }
            Some(Ok(Message::Binary(bin))) => {
                break Some(Err(WsError::Message(format!(
                    "收到非预期的二进制帧 ({} 字节)",
                    bin.len()
                ))));
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {
                continue;
            }
            Some(Ok(Message::Close(close_frame))) => {
                debug!("[WsClient] 收到 Close 帧: {:?}", close_frame);
                break None;
            }
            Some(Err(TungsteniteError::ConnectionClosed)) | Some(Err(TungsteniteError::AlreadyClosed)) => {
                debug!("[WsClient] 连接已关闭");
                break None;
            }
            Some(Err(e)) => {
                error!("[WsClient] 接收帧时发生底层错误: {}", e);
                break Some(Err(WsError::WebSocketProtocolError(e)));
            }
            None => {
                debug!("[WsClient] 接收流已结束");
                break None;
            }
        }
    }
}

/// 判断一个接收错误是否只影响单帧 (可丢弃后继续接收)。
pub fn is_recoverable(err: &WsError) -> bool {
    matches!(err, WsError::DeserializationError(_) | WsError::Message(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_websocket_scheme() {
        let result = connect_client("http://127.0.0.1:9090", Duration::from_millis(200)).await;
        assert!(matches!(result, Err(WsError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn rejects_unparseable_url() {
        let result = connect_client("not a url", Duration::from_millis(200)).await;
        assert!(matches!(result, Err(WsError::InvalidUrl(_))));
    }

    #[test]
    fn only_frame_level_errors_are_recoverable() {
        assert!(is_recoverable(&WsError::DeserializationError("x".into())));
        assert!(is_recoverable(&WsError::Message("binary".into())));
        assert!(!is_recoverable(&WsError::ConnectionClosed));
        assert!(!is_recoverable(&WsError::SendTimeout(10)));
    }
}
