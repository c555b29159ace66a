//! 订阅通道。
//!
//! 一个通道对应一条打开的房间事件流连接。通道持有输出端
//! （有界 mpsc 发送端），HTTP 层持有接收端并在连接存活期间排空它。

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use domain::{ChannelId, RoomEvent, RoomId, Timestamp};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// 通道生命周期状态
///
/// CONNECTING（已分配未注册）→ ACTIVE（已注册、接收事件与心跳）
/// → CLOSING（检测到断开或写失败）→ CLOSED（已移出注册表、输出端已释放）。
/// CLOSED 为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    Connecting = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelState::Connecting,
            1 => ChannelState::Active,
            2 => ChannelState::Closing,
            _ => ChannelState::Closed,
        }
    }
}

/// 单次推送的失败原因
///
/// 推送失败不回传给发布方的调用栈，由通道自身转入 CLOSING。
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("subscriber buffer full (slow consumer)")]
    Full,
    #[error("subscriber disconnected")]
    Disconnected,
    #[error("channel is no longer active")]
    NotActive,
}

/// 一条打开的事件流连接
pub struct SubscriberChannel {
    id: ChannelId,
    room_id: RoomId,
    /// 输出端。CLOSED 时置空，确保接收端能观察到流结束
    sender: Mutex<Option<mpsc::Sender<RoomEvent>>>,
    created_at: Timestamp,
    last_heartbeat: Mutex<Instant>,
    state: AtomicU8,
}

impl SubscriberChannel {
    /// 分配一条新通道及其接收端，初始状态为 CONNECTING
    pub fn new(room_id: RoomId, capacity: usize) -> (Self, mpsc::Receiver<RoomEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let channel = Self {
            id: ChannelId::generate(),
            room_id,
            sender: Mutex::new(Some(sender)),
            created_at: Timestamp::now_utc(),
            last_heartbeat: Mutex::new(Instant::now()),
            state: AtomicU8::new(ChannelState::Connecting as u8),
        };
        (channel, receiver)
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// CONNECTING → ACTIVE，注册完成后由中枢调用
    pub(crate) fn activate(&self) {
        let _ = self.state.compare_exchange(
            ChannelState::Connecting as u8,
            ChannelState::Active as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// 向远端连接推送一个事件
    ///
    /// 非阻塞：缓冲已满（慢消费者）或接收端已丢弃（断开）都立即失败，
    /// 并把通道转入 CLOSING。发布方只会看到 Result，不会被慢客户端拖住。
    pub fn push(&self, event: RoomEvent) -> Result<(), PushError> {
        if self.state() != ChannelState::Active {
            return Err(PushError::NotActive);
        }

        let sender = match self.sender.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(sender) => sender.clone(),
                None => return Err(PushError::Disconnected),
            },
            Err(_) => return Err(PushError::Disconnected),
        };

        match sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.begin_close();
                Err(PushError::Full)
            }
            Err(TrySendError::Closed(_)) => {
                self.begin_close();
                Err(PushError::Disconnected)
            }
        }
    }

    /// 转入 CLOSING；对已处于 CLOSING / CLOSED 的通道是幂等空操作
    pub fn begin_close(&self) {
        for from in [ChannelState::Connecting, ChannelState::Active] {
            if self
                .state
                .compare_exchange(
                    from as u8,
                    ChannelState::Closing as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return;
            }
        }
    }

    /// 完成清理：释放输出端并进入终态 CLOSED
    ///
    /// 丢弃发送端后接收端排空缓冲即得到流结束，连接随之关闭。
    pub(crate) fn finish_close(&self) {
        self.begin_close();
        self.state
            .store(ChannelState::Closed as u8, Ordering::Release);
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }

    /// 心跳送达后刷新活跃时间
    pub(crate) fn mark_heartbeat(&self) {
        if let Ok(mut last) = self.last_heartbeat.lock() {
            *last = Instant::now();
        }
    }

    pub fn last_heartbeat(&self) -> Instant {
        self.last_heartbeat
            .lock()
            .map(|last| *last)
            .unwrap_or_else(|_| Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn room() -> RoomId {
        RoomId::new(Uuid::new_v4())
    }

    #[test]
    fn test_lifecycle_transitions() {
        let (channel, _receiver) = SubscriberChannel::new(room(), 4);
        assert_eq!(channel.state(), ChannelState::Connecting);

        channel.activate();
        assert_eq!(channel.state(), ChannelState::Active);

        channel.begin_close();
        assert_eq!(channel.state(), ChannelState::Closing);

        channel.finish_close();
        assert_eq!(channel.state(), ChannelState::Closed);

        // CLOSED 是终态
        channel.activate();
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn test_push_delivers_in_order() {
        let (channel, mut receiver) = SubscriberChannel::new(room(), 4);
        channel.activate();

        channel.push(RoomEvent::new("new-message", json!({"seq": 1}))).unwrap();
        channel.push(RoomEvent::new("new-message", json!({"seq": 2}))).unwrap();

        assert_eq!(receiver.recv().await.unwrap().payload["seq"], 1);
        assert_eq!(receiver.recv().await.unwrap().payload["seq"], 2);
    }

    #[test]
    fn test_push_to_disconnected_receiver_begins_close() {
        let (channel, receiver) = SubscriberChannel::new(room(), 4);
        channel.activate();
        drop(receiver);

        let result = channel.push(RoomEvent::heartbeat());
        assert!(matches!(result, Err(PushError::Disconnected)));
        assert_eq!(channel.state(), ChannelState::Closing);
    }

    #[test]
    fn test_full_buffer_fails_without_blocking() {
        let (channel, _receiver) = SubscriberChannel::new(room(), 1);
        channel.activate();

        channel.push(RoomEvent::heartbeat()).unwrap();
        let result = channel.push(RoomEvent::heartbeat());
        assert!(matches!(result, Err(PushError::Full)));
        assert_eq!(channel.state(), ChannelState::Closing);
    }

    #[test]
    fn test_push_after_close_is_rejected() {
        let (channel, _receiver) = SubscriberChannel::new(room(), 4);
        channel.activate();
        channel.finish_close();

        let result = channel.push(RoomEvent::heartbeat());
        assert!(matches!(result, Err(PushError::NotActive)));
    }

    #[tokio::test]
    async fn test_finish_close_releases_sink() {
        let (channel, mut receiver) = SubscriberChannel::new(room(), 4);
        channel.activate();
        channel.push(RoomEvent::heartbeat()).unwrap();
        channel.finish_close();

        // 缓冲中的事件仍可排空，随后观察到流结束
        assert!(receiver.recv().await.is_some());
        assert!(receiver.recv().await.is_none());
    }
}
