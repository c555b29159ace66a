//! 登录限流中间件。
//!
//! 在请求进入认证逻辑之前做准入检查。被拒绝的请求直接返回 429，
//! 不会调用下游处理器。

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, warn};

use crate::state::AppState;

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    let client_key = client_key(&request);

    if state.rate_limiter.admit(&client_key, &path) {
        return next.run(request).await;
    }

    // 准入拒绝是预期结果，不按错误记日志
    debug!(%client_key, %path, "login attempt throttled");
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "Too many login attempts. Please try again later."
        })),
    )
        .into_response()
}

/// 提取限流键：转发头的第一跳，否则直连对端地址
fn client_key(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first_hop) = forwarded.split(',').next() {
            let first_hop = first_hop.trim();
            if !first_hop.is_empty() {
                return first_hop.to_owned();
            }
        }
    }

    if let Some(info) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return info.0.ip().to_string();
    }

    // 没拿到任何客户端地址时所有请求共享同一个桶。
    // 通常意味着服务没用 into_make_service_with_connect_info 启动
    warn!("no client address available, falling back to shared rate limit key");
    "unknown".to_owned()
}
