//! 统一配置中心
//!
//! 提供应用的全局配置管理，包括：
//! - 登录限流
//! - 房间事件流
//! - 服务设置

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 登录限流配置
    pub rate_limit: RateLimitConfig,
    /// 事件流配置
    pub stream: StreamConfig,
    /// 服务配置
    pub server: ServerConfig,
}

/// 登录限流配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// 令牌桶容量（每个客户端地址的突发上限）
    pub capacity: u32,
    /// 补充窗口：每个窗口补满 `capacity` 个令牌
    pub refill_window_secs: u64,
    /// 测试模式旁路开关，开启后所有请求直接放行
    pub bypass: bool,
    /// 空闲桶驱逐阈值，超过该时长未活动的桶会被清理
    pub idle_evict_secs: u64,
}

impl RateLimitConfig {
    pub fn refill_window(&self) -> Duration {
        Duration::from_secs(self.refill_window_secs)
    }

    pub fn idle_evict_after(&self) -> Duration {
        Duration::from_secs(self.idle_evict_secs)
    }
}

/// 事件流配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// 心跳间隔（秒）
    pub heartbeat_interval_secs: u64,
    /// 每个订阅通道的缓冲容量，写满视为慢消费者
    pub channel_capacity: usize,
}

impl StreamConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    /// 从环境变量加载配置
    /// 本子系统的所有配置项都有安全默认值，缺失的环境变量回退到默认
    pub fn from_env() -> Self {
        Self {
            rate_limit: RateLimitConfig {
                capacity: env::var("RATE_LIMIT_CAPACITY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
                refill_window_secs: env::var("RATE_LIMIT_WINDOW_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
                bypass: env::var("RATE_LIMIT_BYPASS")
                    .ok()
                    .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
                    .unwrap_or(false),
                idle_evict_secs: env::var("RATE_LIMIT_IDLE_EVICT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            },
            stream: StreamConfig {
                heartbeat_interval_secs: env::var("HEARTBEAT_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(25),
                channel_capacity: env::var("STREAM_CHANNEL_CAPACITY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(64),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8080),
            },
        }
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.capacity == 0 {
            return Err(ConfigError::InvalidRateLimitConfig(
                "bucket capacity must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.refill_window_secs == 0 {
            return Err(ConfigError::InvalidRateLimitConfig(
                "refill window must be greater than 0 seconds".to_string(),
            ));
        }

        if self.rate_limit.idle_evict_secs == 0 {
            return Err(ConfigError::InvalidRateLimitConfig(
                "idle eviction threshold must be greater than 0 seconds".to_string(),
            ));
        }

        if self.stream.channel_capacity == 0 {
            return Err(ConfigError::InvalidStreamConfig(
                "channel capacity must be greater than 0".to_string(),
            ));
        }

        if self.stream.heartbeat_interval_secs == 0 {
            return Err(ConfigError::InvalidStreamConfig(
                "heartbeat interval must be greater than 0 seconds".to_string(),
            ));
        }

        // 旁路开关只应在自动化测试环境使用
        if self.rate_limit.bypass {
            eprintln!("⚠️ WARNING: login rate limiting is bypassed, do not use in production!");
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid rate limit configuration: {0}")]
    InvalidRateLimitConfig(String),
    #[error("Invalid stream configuration: {0}")]
    InvalidStreamConfig(String),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] std::env::VarError),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
