//! 房间订阅注册表。
//!
//! roomId 到活动订阅通道集合的并发映射。临界区只覆盖映射本身的
//! 插入 / 移除 / 克隆，推送发生在任何注册表锁之外。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use domain::{ChannelId, RoomId};
use tracing::error;

use crate::subscriber::SubscriberChannel;

/// roomId → 订阅通道集合
///
/// 不变量：一条通道同一时间至多出现在一个房间的集合中；
/// CLOSED 的通道不会留在任何集合里（由中枢在清理路径上保证）。
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, Vec<Arc<SubscriberChannel>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把通道加入其房间的集合，集合不存在则创建
    ///
    /// 激活与插入在同一写临界区内完成：快照只在读锁下产生，
    /// 因此发布方永远不会观察到已注册但尚未激活的通道。
    pub fn register(&self, channel: Arc<SubscriberChannel>) {
        match self.rooms.write() {
            Ok(mut rooms) => {
                channel.activate();
                rooms.entry(channel.room_id()).or_default().push(channel);
            }
            Err(_) => {
                error!("room registry lock poisoned, dropping registration");
            }
        }
    }

    /// 把通道移出其房间的集合
    ///
    /// 集合随之清空时剪除整个房间条目，返回被移除的通道。
    pub fn unregister(
        &self,
        room_id: RoomId,
        channel_id: ChannelId,
    ) -> Option<Arc<SubscriberChannel>> {
        let mut rooms = self.rooms.write().ok()?;
        let channels = rooms.get_mut(&room_id)?;
        let index = channels
            .iter()
            .position(|channel| channel.id() == channel_id)?;
        let removed = channels.swap_remove(index);
        if channels.is_empty() {
            rooms.remove(&room_id);
        }
        Some(removed)
    }

    /// 房间订阅者的时间点快照
    ///
    /// 在读锁内克隆引用，扇出迭代与并发的注册 / 注销互不干扰。
    pub fn snapshot(&self, room_id: RoomId) -> Vec<Arc<SubscriberChannel>> {
        self.rooms
            .read()
            .ok()
            .and_then(|rooms| rooms.get(&room_id).cloned())
            .unwrap_or_default()
    }

    /// 所有房间全部通道的快照，心跳巡检用
    pub fn snapshot_all(&self) -> Vec<Arc<SubscriberChannel>> {
        self.rooms
            .read()
            .map(|rooms| rooms.values().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// 取走全部通道并清空注册表，进程停机时用
    pub fn drain(&self) -> Vec<Arc<SubscriberChannel>> {
        match self.rooms.write() {
            Ok(mut rooms) => rooms.drain().flat_map(|(_, channels)| channels).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// 当前有订阅者的房间数
    pub fn room_count(&self) -> usize {
        self.rooms.read().map(|rooms| rooms.len()).unwrap_or(0)
    }

    /// 某房间当前的订阅者数
    pub fn subscriber_count(&self, room_id: RoomId) -> usize {
        self.rooms
            .read()
            .map(|rooms| rooms.get(&room_id).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }
}
