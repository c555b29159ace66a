//! 领域层。
//!
//! 只包含贯穿并发子系统的值对象和事件类型，
//! 用户、聊天室、消息等实体由外部协作方持久化，不在本层建模。

pub mod events;
pub mod value_objects;

pub use events::RoomEvent;
pub use value_objects::{ChannelId, RoomId, Timestamp};
