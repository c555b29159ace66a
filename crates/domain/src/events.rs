//! 房间事件类型。
//!
//! 事件仅存在于一次扇出调用期间，不做持久化；
//! 发布顺序即为事件的隐式时间戳。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 推送给房间订阅者的单个事件。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomEvent {
    /// 事件类型标签，例如 "new-message"。
    pub event: String,
    /// JSON 序列化的事件负载。
    pub payload: Value,
}

impl RoomEvent {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// 新消息事件，消息创建路径在持久化成功后发布。
    pub fn new_message(payload: Value) -> Self {
        Self::new("new-message", payload)
    }

    /// 心跳帧，防止中间代理因空闲超时断开连接。
    pub fn heartbeat() -> Self {
        Self::new("heartbeat", Value::String("ping".to_string()))
    }
}
