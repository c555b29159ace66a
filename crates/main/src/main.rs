//! 主应用程序入口
//!
//! 启动 Axum Web API 服务，并托管两个后台任务：
//! 订阅通道的心跳巡检和空闲令牌桶的周期清理。

use std::net::SocketAddr;
use std::sync::Arc;

use application::{spawn_heartbeat, BroadcastHub, LoginRateLimiter};
use config::AppConfig;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 读取环境变量配置
    let config = AppConfig::from_env();
    config.validate()?;

    // 进程级单实例：启动时构造，停机时销毁
    let hub = Arc::new(BroadcastHub::new(&config.stream));
    let rate_limiter = Arc::new(LoginRateLimiter::new(&config.rate_limit));

    // 心跳巡检后台任务
    let heartbeat_task = spawn_heartbeat(hub.clone());

    // 空闲令牌桶的周期清理
    let eviction_task = {
        let rate_limiter = rate_limiter.clone();
        let idle_after = config.rate_limit.idle_evict_after();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(idle_after / 2);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = rate_limiter.evict_idle(idle_after);
                if evicted > 0 {
                    tracing::debug!(evicted, "evicted idle rate limit buckets");
                }
            }
        })
    };

    let state = AppState::new(hub.clone(), rate_limiter);
    let app = router(state);

    // 启动 Web 服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("聊天服务器启动在 http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // 停机：停掉后台任务，关闭所有订阅通道，连接不跨进程生命周期泄漏
    heartbeat_task.abort();
    eviction_task.abort();
    hub.shutdown();
    tracing::info!("所有订阅通道已关闭");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("收到停机信号");
}
