// RobotRelayService/tests/gateway_link_test.rs

mod common;

use common::{init_test_logger, test_config, test_state, wait_until, FakeGateway, StalledGateway};
use common_models::enums::ChannelKind;
use robot_relay_service::db::{ROBOTS, SENSOR_LOGS};
use robot_relay_service::ws_server::client_session::ClientSession;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn browser_session(channel: ChannelKind, robot_id: &str) -> (Arc<ClientSession>, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(16);
    let addr: SocketAddr = "127.0.0.1:50000".parse().unwrap();
    (Arc::new(ClientSession::new(addr, channel, robot_id.to_string(), tx)), rx)
}

async fn next_forward(rx: &mut mpsc::Receiver<String>) -> Value {
    let text = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("等待转发消息超时")
        .expect("会话队列已关闭");
    serde_json::from_str(&text).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connect_subscribes_fixed_topics_and_records_robot() {
    init_test_logger();
    let gateway = FakeGateway::start().await;
    let state = test_state(test_config());

    assert!(state.gateway.connect("R1", &gateway.uri()).await);
    assert!(wait_until(Duration::from_secs(2), || gateway.frames_with_op("subscribe").len() == 4).await);

    let topics: Vec<Value> = gateway.frames_with_op("subscribe").iter().map(|f| f["topic"].clone()).collect();
    for topic in ["/robot_status", "/sensor_data", "/camera_feed", "/map_data"] {
        assert!(topics.contains(&json!(topic)), "缺少订阅 {}", topic);
    }

    let record = state.store.find(ROBOTS, "R1").await.unwrap().unwrap();
    assert_eq!(record["connection_status"], "connected");
    assert_eq!(record["gateway_uri"], gateway.uri());
    assert_eq!(state.gateway.connected_robots(), vec!["R1".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconnect_replaces_previous_connection() {
    init_test_logger();
    let gateway = FakeGateway::start().await;
    let state = test_state(test_config());

    assert!(state.gateway.connect("R1", &gateway.uri()).await);
    assert!(state.gateway.connect("R1", &gateway.uri()).await);

    assert_eq!(state.gateway.connection_count(), 1);
    assert!(wait_until(Duration::from_secs(2), || gateway.live_connections() == 1).await);
    assert_eq!(gateway.accepted_connections(), 2);
    // 每个连接各订阅一次固定话题集合
    assert!(wait_until(Duration::from_secs(2), || gateway.frames_with_op("subscribe").len() == 8).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_connects_leave_one_connection() {
    init_test_logger();
    let gateway = FakeGateway::start().await;
    let state = test_state(test_config());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let link = Arc::clone(&state.gateway);
        let uri = gateway.uri();
        handles.push(tokio::spawn(async move { link.connect("R1", &uri).await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    assert_eq!(state.gateway.connection_count(), 1);
    assert!(wait_until(Duration::from_secs(3), || gateway.live_connections() == 1).await);
}

#[tokio::test]
async fn publish_without_connection_fails() {
    init_test_logger();
    let state = test_state(test_config());
    assert!(!state.gateway.publish("R1", "/cmd_vel", "geometry_msgs/msg/Twist", json!({})).await);
}

#[tokio::test]
async fn unreachable_gateway_returns_false() {
    init_test_logger();
    let mut config = test_config();
    config.gateway.connect_timeout_ms = 300;
    let state = test_state(config);
    assert!(!state.gateway.connect("R1", "ws://127.0.0.1:1").await);
    assert!(!state.gateway.connect("R1", "http://127.0.0.1:1").await);
    assert!(!state.gateway.is_connected("R1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn published_frames_reach_gateway() {
    init_test_logger();
    let gateway = FakeGateway::start().await;
    let state = test_state(test_config());
    assert!(state.gateway.connect("R1", &gateway.uri()).await);

    assert!(
        state
            .gateway
            .publish("R1", "/goal", "geometry_msgs/PoseStamped", json!({"x": 1}))
            .await
    );
    assert!(wait_until(Duration::from_secs(2), || gateway.publishes_to("/goal").len() == 1).await);
    let frame = &gateway.publishes_to("/goal")[0];
    assert_eq!(frame["type"], "geometry_msgs/PoseStamped");
    assert_eq!(frame["msg"]["x"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn robot_status_is_stored_and_forwarded_to_monitoring() {
    init_test_logger();
    let gateway = FakeGateway::start().await;
    let state = test_state(test_config());
    let (monitoring, mut monitoring_rx) = browser_session(ChannelKind::Monitoring, "R1");
    let (sensor, mut sensor_rx) = browser_session(ChannelKind::Sensor, "R1");
    state.registry.connect(Arc::clone(&monitoring)).await;
    state.registry.connect(Arc::clone(&sensor)).await;
    assert!(state.gateway.connect("R1", &gateway.uri()).await);

    gateway.push(&json!({"op": "publish", "topic": "/robot_status", "msg": {"data": "charging"}}));
    let forward = next_forward(&mut monitoring_rx).await;
    assert_eq!(forward["message_type"], "robot_status");
    assert_eq!(forward["robot_id"], "R1");
    assert_eq!(forward["topic"], "/robot_status");
    assert_eq!(forward["msg"]["data"], "charging");

    let record = state.store.find(ROBOTS, "R1").await.unwrap().unwrap();
    assert_eq!(record["status"]["data"], "charging");

    gateway.push(&json!({"op": "publish", "topic": "/sensor_data", "msg": {"position": [1.0]}}));
    let forward = next_forward(&mut sensor_rx).await;
    assert_eq!(forward["message_type"], "sensor_data");
    let logs = state
        .store
        .find_where(SENSOR_LOGS, "robot_id", &json!("R1"))
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert!(monitoring_rx.try_recv().is_err(), "传感器消息不应转发到 monitoring 通道");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_and_unknown_frames_are_dropped() {
    init_test_logger();
    let gateway = FakeGateway::start().await;
    let state = test_state(test_config());
    let (monitoring, mut monitoring_rx) = browser_session(ChannelKind::Monitoring, "R1");
    state.registry.connect(Arc::clone(&monitoring)).await;
    assert!(state.gateway.connect("R1", &gateway.uri()).await);

    gateway.push_raw("这不是 JSON");
    gateway.push(&json!({"op": "publish", "topic": "/unknown", "msg": {}}));
    gateway.push(&json!({"op": "status", "level": "info"}));
    gateway.push(&json!({"op": "publish", "topic": "/map_data", "msg": {"width": 4}}));

    // 前面的帧全部被丢弃，接收循环仍然存活并处理了最后一帧
    let forward = next_forward(&mut monitoring_rx).await;
    assert_eq!(forward["message_type"], "map_data");
    assert!(state.gateway.is_connected("R1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn gateway_close_marks_robot_disconnected() {
    init_test_logger();
    let gateway = FakeGateway::start().await;
    let state = test_state(test_config());
    assert!(state.gateway.connect("R1", &gateway.uri()).await);

    gateway.close_all();
    let link = Arc::clone(&state.gateway);
    assert!(wait_until(Duration::from_secs(3), || !link.is_connected("R1")).await);

    // 连接表先于状态记录更新，这里轮询存储直到断开状态落盘
    let mut record = Value::Null;
    for _ in 0..100 {
        record = state.store.find(ROBOTS, "R1").await.unwrap().unwrap();
        if record["connection_status"] == "disconnected" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(record["connection_status"], "disconnected");
    assert!(record["last_disconnected"].is_string());
    assert!(!state.gateway.publish("R1", "/cmd_vel", "geometry_msgs/msg/Twist", json!({})).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn explicit_disconnect_is_idempotent() {
    init_test_logger();
    let gateway = FakeGateway::start().await;
    let state = test_state(test_config());
    assert!(state.gateway.connect("R1", &gateway.uri()).await);

    state.gateway.disconnect("R1").await;
    state.gateway.disconnect("R1").await;
    assert_eq!(state.gateway.connection_count(), 0);
    assert!(wait_until(Duration::from_secs(2), || gateway.live_connections() == 0).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stalled_gateway_publish_times_out_and_disconnects() {
    init_test_logger();
    let gateway = StalledGateway::start().await;
    let mut config = test_config();
    config.gateway.publish_timeout_ms = 300;
    let state = test_state(config);
    assert!(state.gateway.connect("R1", &gateway.uri()).await);

    // 对端不读取，内核缓冲区写满后发送超时
    let payload = json!({"data": "x".repeat(16 * 1024 * 1024)});
    let mut published = true;
    for _ in 0..8 {
        published = state
            .gateway
            .publish("R1", "/upload", "std_msgs/msg/String", payload.clone())
            .await;
        if !published {
            break;
        }
    }
    assert!(!published, "发送端被阻塞时发布应失败");
    assert!(!state.gateway.is_connected("R1"));

    let record = state.store.find(ROBOTS, "R1").await.unwrap().unwrap();
    assert_eq!(record["connection_status"], "disconnected");
    assert!(!state.gateway.publish("R1", "/cmd_vel", "geometry_msgs/msg/Twist", json!({})).await);
}
