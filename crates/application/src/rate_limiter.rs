//! 登录限流器。
//!
//! 按客户端地址维护令牌桶，只对登录路由做准入检查，
//! 防止口令暴力破解。默认策略为每分钟 5 次尝试。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use config::RateLimitConfig;

/// 登录路由，只有命中该路径的请求才消耗令牌
pub const LOGIN_PATH: &str = "/api/auth/login";

/// 令牌桶内部状态
///
/// 补充与扣减在同一临界区内完成，并发调用不会观察到中间值。
#[derive(Debug)]
struct BucketState {
    /// 当前令牌数，始终满足 0 <= tokens <= capacity
    tokens: f64,
    /// 上次补充令牌的时刻
    last_refill: Instant,
    /// 最后一次消费尝试的时刻，用于空闲驱逐
    last_seen: Instant,
}

/// 单个客户端地址的令牌桶
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// 创建满桶：容量 `capacity`，每个 `refill_window` 补满一桶
    pub fn new(capacity: u32, refill_window: Duration) -> Self {
        let capacity = f64::from(capacity);
        let now = Instant::now();
        Self {
            capacity,
            refill_per_sec: capacity / refill_window.as_secs_f64(),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: now,
                last_seen: now,
            }),
        }
    }

    /// 尝试消费一个令牌
    ///
    /// 先按流逝时间按比例补充（封顶到容量），再扣减。
    /// 返回 false 表示桶已耗尽，请求应被拒绝。
    pub fn try_consume(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            // 锁中毒意味着持锁线程 panic，属于进程级故障，放行请求
            return true;
        };

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill);
        state.tokens =
            (state.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
        state.last_seen = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// 最后一次消费尝试的时刻
    fn last_seen(&self) -> Option<Instant> {
        self.state.lock().ok().map(|state| state.last_seen)
    }

    #[cfg(test)]
    fn available(&self) -> f64 {
        self.state.lock().map(|state| state.tokens).unwrap_or(0.0)
    }
}

/// 登录限流器
///
/// 持有客户端地址到令牌桶的注册表。桶按需惰性创建；
/// 非登录路径完全绕过注册表，避免为不限流的流量积累条目。
pub struct LoginRateLimiter {
    capacity: u32,
    refill_window: Duration,
    /// 测试模式旁路：准入永远通过且不触碰注册表
    bypass: bool,
    buckets: RwLock<HashMap<String, Arc<TokenBucket>>>,
}

impl LoginRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_policy(config.capacity, config.refill_window(), config.bypass)
    }

    pub fn with_policy(capacity: u32, refill_window: Duration, bypass: bool) -> Self {
        Self {
            capacity,
            refill_window,
            bypass,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// 准入检查
    ///
    /// 只有登录路由消耗令牌；其余路径无条件放行。
    /// 返回 false 时调用方应返回 429 且不得调用下游处理器。
    pub fn admit(&self, client_key: &str, path: &str) -> bool {
        if self.bypass {
            return true;
        }

        if !path.contains(LOGIN_PATH) {
            return true;
        }

        self.resolve_bucket(client_key).try_consume()
    }

    /// 查找或创建客户端的令牌桶
    ///
    /// 写锁内的 entry 调用保证同一新地址的并发首次请求共享同一个桶。
    fn resolve_bucket(&self, client_key: &str) -> Arc<TokenBucket> {
        if let Ok(buckets) = self.buckets.read() {
            if let Some(bucket) = buckets.get(client_key) {
                return bucket.clone();
            }
        }

        match self.buckets.write() {
            Ok(mut buckets) => buckets
                .entry(client_key.to_owned())
                .or_insert_with(|| Arc::new(TokenBucket::new(self.capacity, self.refill_window)))
                .clone(),
            // 锁中毒时退化为一次性桶，不影响正确性，只丢失计数
            Err(_) => Arc::new(TokenBucket::new(self.capacity, self.refill_window)),
        }
    }

    /// 清理空闲桶（防止按地址无限增长）
    ///
    /// 原实现从不回收；这里显式选择按空闲时长驱逐，
    /// 由后台任务周期调用。返回被移除的桶数量。
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let Ok(mut buckets) = self.buckets.write() else {
            return 0;
        };

        let now = Instant::now();
        let before = buckets.len();
        buckets.retain(|_, bucket| match bucket.last_seen() {
            Some(last_seen) => now.duration_since(last_seen) < max_idle,
            None => false,
        });
        before - buckets.len()
    }

    /// 当前注册表中的桶数量
    pub fn bucket_count(&self) -> usize {
        self.buckets.read().map(|buckets| buckets.len()).unwrap_or(0)
    }
}
