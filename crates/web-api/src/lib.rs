//! Web API 层。
//!
//! 提供 Axum 路由，把房间事件流和登录限流接到 HTTP 边界上。
//! 用户、聊天室、消息的 CRUD 路由由外部协作方挂载，
//! 本层只暴露并发子系统的两个面：SSE 订阅端点和限流中间件。

mod rate_limit;
mod routes;
mod state;
mod stream;

pub use rate_limit::rate_limit_middleware;
pub use routes::{router, router_with};
pub use state::AppState;
