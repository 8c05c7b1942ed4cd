// RobotRelayService/src/ws_server/control_session.rs

//! 操作员遥控会话。
//!
//! 每个入站按键事件都会更新本会话的按键状态、重新混合速度指令、
//! 通过网关发布到 `/cmd_vel` 并向客户端回送应答。
//! 会话因任何原因结束时都会先发布一条全零指令，确保机器人停下。

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use common_models::enums::{ChannelKind, KeyAction};
use common_models::robot_models::{Twist, CMD_VEL_TOPIC, TWIST_MSG_TYPE};
use common_models::ws_payloads::{ControlInput, ControlReply};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::client_session::{ClientSession, OUTBOUND_QUEUE_CAPACITY};
use super::command_mixer::{mix, KeyState};
use super::service::spawn_sender_task;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPhase {
    Open,
    Active,
    Closed,
}

/// 处理一条入站文本帧并生成应答。解析失败不影响按键状态。
pub async fn handle_control_text(text: &str, keys: &mut KeyState, robot_id: &str, state: &AppState) -> ControlReply {
    let input = match serde_json::from_str::<ControlInput>(text) {
        Ok(input) => input,
        Err(e) => {
            warn!("[ControlSession] 机器人 {} 收到无效的按键事件: {} ({})", robot_id, text, e);
            return ControlReply::error(format!("无效的按键事件: {}", e));
        }
    };

    match input.action {
        KeyAction::KeyDown => keys.press(&input.key),
        KeyAction::KeyUp => keys.release(&input.key),
    }
    let twist = mix(&keys.directions(), &state.mixer);
    debug!(
        "[ControlSession] 机器人 {}: {:?} {} -> linear.x={:.2}, angular.z={:.2}",
        robot_id, input.action, input.key, twist.linear.x, twist.angular.z
    );

    if state
        .gateway
        .publish(robot_id, CMD_VEL_TOPIC, TWIST_MSG_TYPE, twist.to_bridge_msg())
        .await
    {
        ControlReply::Ok {
            pressed_keys: keys.pressed_keys(),
            twist,
            timestamp: Utc::now(),
        }
    } else {
        ControlReply::error(format!("机器人 {} 未连接网关，速度指令未发送", robot_id))
    }
}

/// 运行一个遥控会话，直到客户端断开。
pub async fn run_control_session(socket: WebSocket, addr: SocketAddr, robot_id: String, state: AppState) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_CAPACITY);
    let session = Arc::new(ClientSession::new(addr, ChannelKind::Control, robot_id.clone(), tx));
    let client_id = session.client_id;
    let sender_task = spawn_sender_task(ws_sender, rx, client_id);

    let mut phase = ControlPhase::Open;
    info!("[ControlSession] 新遥控会话 {}: addr={}, 机器人={}", client_id, addr, robot_id);
    state.registry.connect(Arc::clone(&session)).await;
    let mut keys = KeyState::new();

    debug!("[ControlSession] 会话 {} 状态 {:?} -> {:?}", client_id, phase, ControlPhase::Active);
    phase = ControlPhase::Active;
    loop {
        let inbound = tokio::select! {
            _ = session.closed() => {
                info!("[ControlSession] 会话 {} 被请求关闭", client_id);
                break;
            }
            inbound = ws_receiver.next() => inbound,
        };
        let reply = match inbound {
            Some(Ok(Message::Text(text))) => handle_control_text(&text, &mut keys, &robot_id, &state).await,
            Some(Ok(Message::Binary(_))) => ControlReply::error("遥控通道只接受 JSON 文本帧"),
            Some(Ok(Message::Close(frame))) => {
                info!("[ControlSession] 会话 {} 客户端关闭连接: {:?}", client_id, frame);
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!("[ControlSession] 会话 {} 读取出错: {}", client_id, e);
                break;
            }
            None => {
                info!("[ControlSession] 会话 {} 入站流已结束", client_id);
                break;
            }
        };

        let text = match serde_json::to_string(&reply) {
            Ok(text) => text,
            Err(e) => {
                error!("[ControlSession] 应答序列化失败: {}", e);
                continue;
            }
        };
        if session.sender.send(text).await.is_err() {
            info!("[ControlSession] 会话 {} 发送任务已结束", client_id);
            break;
        }
    }

    // 无论以何种方式结束，先让机器人停下
    keys.clear();
    if state
        .gateway
        .publish(&robot_id, CMD_VEL_TOPIC, TWIST_MSG_TYPE, Twist::zero().to_bridge_msg())
        .await
    {
        info!("[ControlSession] 会话 {} 结束，已向机器人 {} 发布停止指令", client_id, robot_id);
    } else {
        warn!("[ControlSession] 会话 {} 结束，机器人 {} 未连接网关，停止指令未发送", client_id, robot_id);
    }

    state.registry.disconnect(&session).await;
    drop(session);
    if let Err(e) = sender_task.await {
        warn!("[ControlSession] 会话 {} 的发送任务异常结束: {:?}", client_id, e);
    }
    debug!("[ControlSession] 会话 {} 状态 {:?} -> {:?}", client_id, phase, ControlPhase::Closed);
}
