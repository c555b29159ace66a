use std::sync::Arc;

use application::{BroadcastHub, LoginRateLimiter};

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
    pub rate_limiter: Arc<LoginRateLimiter>,
}

impl AppState {
    pub fn new(hub: Arc<BroadcastHub>, rate_limiter: Arc<LoginRateLimiter>) -> Self {
        Self { hub, rate_limiter }
    }
}
