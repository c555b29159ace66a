//! 应用层实现。
//!
//! 这里提供请求期的并发原语：按客户端地址限流登录请求的令牌桶，
//! 以及向房间内的实时订阅者扇出事件的广播中枢。
//! 两者都是进程内、驻留内存的组件，由启动代码构造并注入，
//! 不依赖任何全局可变状态。

pub mod hub;
pub mod rate_limiter;
pub mod registry;
pub mod subscriber;

pub use hub::{spawn_heartbeat, BroadcastHub, RoomSubscription};
pub use rate_limiter::{LoginRateLimiter, TokenBucket, LOGIN_PATH};
pub use registry::RoomRegistry;
pub use subscriber::{ChannelState, PushError, SubscriberChannel};
