use axum::{http::StatusCode, middleware, routing::get, Router};

use crate::{rate_limit::rate_limit_middleware, state::AppState, stream::stream_messages};

pub fn router(state: AppState) -> Router {
    router_with(state, Router::new())
}

/// 组装路由并套上限流中间件
///
/// `collaborator_routes` 供外部协作方挂载认证、房间、消息等 CRUD
/// 端点；中间件作用于整棵路由树，但只有登录路径会消耗令牌。
pub fn router_with(state: AppState, collaborator_routes: Router<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chatrooms/{room_id}/stream", get(stream_messages))
        .merge(collaborator_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}
