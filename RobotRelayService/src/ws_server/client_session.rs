use chrono::{DateTime, Utc};
use common_models::enums::ChannelKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

/// 每个会话出站队列的容量 (JSON 文本帧)。
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// 代表一个已连接到服务器的浏览器 WebSocket 会话的状态及相关句柄。
///
/// 每个成功升级的 WebSocket 连接都会在服务端对应一个 `ClientSession` 实例，
/// 绑定到唯一的 (通道类型, 机器人 ID) 组合。
/// 出站数据不直接写入套接字，而是推入 `sender` 队列，由会话的发送任务统一写出；
/// 这样订阅注册表的广播和会话自身的遥测推送可以并发进行。
#[derive(Debug)]
pub struct ClientSession {
    /// 服务端在会话创建时生成的唯一标识符 (UUID v4)。
    pub client_id: Uuid,

    /// 会话所属的通道类型。
    pub channel: ChannelKind,

    /// 会话绑定的机器人 ID。
    pub robot_id: String,

    /// 出站队列的发送端。会话结束时随最后一个 `Arc<ClientSession>` 一起释放，
    /// 发送任务因此得知队列关闭并关闭底层连接。
    pub sender: mpsc::Sender<String>,

    /// 客户端的网络地址。
    pub addr: SocketAddr,

    /// 会话创建时间 (UTC)。
    pub creation_time: DateTime<Utc>,

    /// 外部请求关闭此会话的标志。
    ///
    /// 订阅注册表在广播失败时设置此标志，会话循环在下一次调度时退出。
    connection_should_close: AtomicBool,
    close_notify: Notify,
}

impl ClientSession {
    /// 创建一个新的 `ClientSession` 实例。
    ///
    /// # 参数
    /// * `addr` - 客户端的网络源地址。
    /// * `channel` - 会话所属的通道类型。
    /// * `robot_id` - 会话绑定的机器人 ID。
    /// * `sender` - 出站队列的发送端。
    pub fn new(addr: SocketAddr, channel: ChannelKind, robot_id: String, sender: mpsc::Sender<String>) -> Self {
        Self {
            client_id: Uuid::new_v4(),
            channel,
            robot_id,
            sender,
            addr,
            creation_time: Utc::now(),
            connection_should_close: AtomicBool::new(false),
            close_notify: Notify::new(),
        }
    }

    /// 请求关闭此会话。可重复调用。
    pub fn request_close(&self) {
        self.connection_should_close.store(true, Ordering::SeqCst);
        self.close_notify.notify_waiters();
    }

    pub fn should_close(&self) -> bool {
        self.connection_should_close.load(Ordering::SeqCst)
    }

    /// 等待关闭请求。若已请求关闭则立即返回。
    pub async fn closed(&self) {
        loop {
            let notified = self.close_notify.notified();
            if self.should_close() {
                return;
            }
            notified.await;
        }
    }
}
