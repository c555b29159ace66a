//! 广播中枢。
//!
//! 编排订阅 / 注销 / 发布，并运行心跳巡检。
//! 中枢与传输层无关：它只管 push / close 语义，
//! 由外层 I/O（SSE 处理器）负责在连接存活期间排空订阅句柄。

use std::sync::Arc;
use std::time::Duration;

use config::StreamConfig;
use domain::{ChannelId, RoomEvent, RoomId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::registry::RoomRegistry;
use crate::subscriber::SubscriberChannel;

/// 房间事件广播中枢
///
/// 进程内单实例，由启动代码构造、注入并在停机时销毁。
/// 注册表与各令牌桶相互独立，任何路径都不会跨二者嵌套加锁。
pub struct BroadcastHub {
    registry: Arc<RoomRegistry>,
    channel_capacity: usize,
    heartbeat_interval: Duration,
}

impl BroadcastHub {
    pub fn new(config: &StreamConfig) -> Self {
        Self::with_settings(config.channel_capacity, config.heartbeat_interval())
    }

    pub fn with_settings(channel_capacity: usize, heartbeat_interval: Duration) -> Self {
        Self {
            registry: Arc::new(RoomRegistry::new()),
            channel_capacity,
            heartbeat_interval,
        }
    }

    /// 为房间创建并注册一条新订阅
    ///
    /// 房间成员资格等授权检查由调用方在此之前完成。
    /// 返回的句柄被丢弃时自动注销，连接断开不会泄漏通道。
    pub fn subscribe(&self, room_id: RoomId) -> RoomSubscription {
        let (channel, receiver) = SubscriberChannel::new(room_id, self.channel_capacity);
        let channel = Arc::new(channel);

        // 注册表在自己的写临界区内完成 CONNECTING → ACTIVE，
        // 并发的发布不会把刚建立的通道当作失效清理掉
        self.registry.register(channel.clone());
        debug!(room_id = %room_id, channel_id = %channel.id(), "subscriber registered");

        RoomSubscription {
            registry: self.registry.clone(),
            channel,
            receiver,
        }
    }

    /// 向房间的当前订阅者扇出一个事件
    ///
    /// 对注册表快照逐个推送，单个通道的失败不影响其余投递，
    /// 也永远不会作为错误抛回发布方。向没有订阅者的房间发布是
    /// 合法的静默空操作。返回成功投递数。
    pub fn publish(&self, room_id: RoomId, event: RoomEvent) -> usize {
        let snapshot = self.registry.snapshot(room_id);
        if snapshot.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        let mut failed: Vec<Arc<SubscriberChannel>> = Vec::new();

        for channel in &snapshot {
            match channel.push(event.clone()) {
                Ok(()) => delivered += 1,
                Err(reason) => {
                    // 断开或慢消费者：本地吞掉，只关闭这一条通道
                    warn!(
                        room_id = %room_id,
                        channel_id = %channel.id(),
                        %reason,
                        "push failed, closing subscriber"
                    );
                    failed.push(channel.clone());
                }
            }
        }

        for channel in failed {
            self.remove_channel(&channel);
        }

        delivered
    }

    /// 心跳巡检：向所有注册通道推送保活帧
    ///
    /// 既防止中间代理的空闲超时，也充当存活探测，
    /// 推送失败走与发布失败相同的清理路径。返回被清理的通道数。
    pub fn heartbeat_sweep(&self) -> usize {
        let mut removed = 0;
        for channel in self.registry.snapshot_all() {
            match channel.push(RoomEvent::heartbeat()) {
                Ok(()) => channel.mark_heartbeat(),
                Err(reason) => {
                    debug!(
                        channel_id = %channel.id(),
                        %reason,
                        "heartbeat failed, closing subscriber"
                    );
                    self.remove_channel(&channel);
                    removed += 1;
                }
            }
        }
        removed
    }

    /// 停机：关闭所有通道并释放其输出端，清空注册表
    pub fn shutdown(&self) {
        let channels = self.registry.drain();
        if channels.is_empty() {
            return;
        }
        info!(count = channels.len(), "closing all subscriber channels");
        for channel in channels {
            channel.begin_close();
            channel.finish_close();
        }
    }

    /// 把失败的通道移出注册表并完成 CLOSING → CLOSED
    fn remove_channel(&self, channel: &SubscriberChannel) {
        channel.begin_close();
        self.registry.unregister(channel.room_id(), channel.id());
        channel.finish_close();
    }

    pub fn subscriber_count(&self, room_id: RoomId) -> usize {
        self.registry.subscriber_count(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.registry.room_count()
    }
}

/// 启动心跳巡检的单例后台任务
pub fn spawn_heartbeat(hub: Arc<BroadcastHub>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(hub.heartbeat_interval);
        // 第一次 tick 立即完成，跳过它避免刚启动就巡检
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = hub.heartbeat_sweep();
            if removed > 0 {
                debug!(removed, "heartbeat sweep cleaned up dead subscribers");
            }
        }
    })
}

/// 一次订阅的接收端句柄
///
/// HTTP 层排空它直到流结束；丢弃句柄（客户端断开、请求超时、
/// 服务停机后连接收尾）即触发注销与通道关闭。
pub struct RoomSubscription {
    registry: Arc<RoomRegistry>,
    channel: Arc<SubscriberChannel>,
    receiver: mpsc::Receiver<RoomEvent>,
}

impl RoomSubscription {
    /// 等待下一个事件；流结束（输出端已释放）时返回 None
    pub async fn recv(&mut self) -> Option<RoomEvent> {
        self.receiver.recv().await
    }

    /// 非阻塞读取，缓冲为空或流已结束时返回 None
    pub fn try_recv(&mut self) -> Option<RoomEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn poll_recv(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<RoomEvent>> {
        self.receiver.poll_recv(cx)
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel.id()
    }

    pub fn room_id(&self) -> RoomId {
        self.channel.room_id()
    }

    pub fn channel(&self) -> &Arc<SubscriberChannel> {
        &self.channel
    }
}

impl Drop for RoomSubscription {
    fn drop(&mut self) {
        self.channel.begin_close();
        self.registry
            .unregister(self.channel.room_id(), self.channel.id());
        self.channel.finish_close();
    }
}
