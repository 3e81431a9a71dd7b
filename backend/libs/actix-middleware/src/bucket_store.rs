//! Token bucket stores
//!
//! Each `(requester, endpoint class)` pair owns one bucket of `capacity`
//! tokens refilled continuously at `refill_per_minute`. A request takes one
//! token or is rejected with the time until the next token arrives.
//!
//! - [`InMemoryBucketStore`]: `governor` keyed limiters, one per class.
//!   Correct for a single instance.
//! - [`RedisBucketStore`]: one Lua script per decision so concurrent
//!   instances share buckets atomically.

use async_trait::async_trait;
use governor::{
    clock::{Clock, DefaultClock},
    middleware::StateInformationMiddleware,
    state::keyed::DefaultKeyedStateStore,
    Quota,
};
use redis::aio::ConnectionManager;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

use crate::rate_limit::{ClassPolicy, EndpointClass, RateLimitConfig};

#[derive(Debug, Error)]
pub enum BucketStoreError {
    #[error("rate limit store timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limit store error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("invalid rate limit policy: {0}")]
    InvalidPolicy(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub requester: String,
    pub class: EndpointClass,
}

impl BucketKey {
    pub fn new(requester: impl Into<String>, class: EndpointClass) -> Self {
        Self {
            requester: requester.into(),
            class,
        }
    }

    pub fn redis_key(&self) -> String {
        format!("rate_limit:{}:{}", self.class.as_str(), self.requester)
    }
}

/// Outcome of taking one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Bucket capacity
    pub limit: u32,
    /// Whole tokens left after this decision
    pub remaining: u32,
    /// Time until the bucket is full again
    pub reset_after: Duration,
    /// Time until the next token; zero when allowed
    pub retry_after: Duration,
}

impl RateDecision {
    pub fn reset_secs(&self) -> u64 {
        ceil_secs(self.reset_after)
    }

    /// Whole seconds a rejected client should wait; never zero.
    pub fn retry_after_secs(&self) -> u64 {
        ceil_secs(self.retry_after).max(1)
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Take one token from the bucket for `key`.
    async fn take(&self, key: &BucketKey) -> Result<RateDecision, BucketStoreError>;

    /// Drop buckets that have refilled completely.
    fn prune(&self) {}
}

type KeyedLimiter = governor::RateLimiter<
    String,
    DefaultKeyedStateStore<String>,
    DefaultClock,
    StateInformationMiddleware,
>;

struct ClassLimiter {
    policy: ClassPolicy,
    limiter: KeyedLimiter,
}

impl ClassLimiter {
    fn new(policy: ClassPolicy) -> Result<Self, BucketStoreError> {
        let capacity = NonZeroU32::new(policy.capacity)
            .ok_or_else(|| BucketStoreError::InvalidPolicy("capacity must be > 0".into()))?;
        let per_minute = NonZeroU32::new(policy.refill_per_minute).ok_or_else(|| {
            BucketStoreError::InvalidPolicy("refill_per_minute must be > 0".into())
        })?;
        let quota = Quota::per_minute(per_minute).allow_burst(capacity);

        Ok(Self {
            policy,
            limiter: governor::RateLimiter::keyed(quota)
                .with_middleware::<StateInformationMiddleware>(),
        })
    }

    fn take(&self, requester: &str) -> RateDecision {
        let interval = self.policy.refill_interval();
        let limit = self.policy.capacity;

        match self.limiter.check_key(&requester.to_string()) {
            Ok(snapshot) => {
                let remaining = snapshot.remaining_burst_capacity();
                RateDecision {
                    allowed: true,
                    limit,
                    remaining,
                    reset_after: interval * limit.saturating_sub(remaining),
                    retry_after: Duration::ZERO,
                }
            }
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                RateDecision {
                    allowed: false,
                    limit,
                    remaining: 0,
                    reset_after: wait + interval * limit.saturating_sub(1),
                    retry_after: wait,
                }
            }
        }
    }
}

/// Process-local buckets.
pub struct InMemoryBucketStore {
    read: ClassLimiter,
    heavy_write: ClassLimiter,
}

impl InMemoryBucketStore {
    pub fn new(config: &RateLimitConfig) -> Result<Self, BucketStoreError> {
        Ok(Self {
            read: ClassLimiter::new(config.read)?,
            heavy_write: ClassLimiter::new(config.heavy_write)?,
        })
    }

    fn class(&self, class: EndpointClass) -> &ClassLimiter {
        match class {
            EndpointClass::Read => &self.read,
            EndpointClass::HeavyWrite => &self.heavy_write,
        }
    }
}

#[async_trait]
impl BucketStore for InMemoryBucketStore {
    async fn take(&self, key: &BucketKey) -> Result<RateDecision, BucketStoreError> {
        Ok(self.class(key.class).take(&key.requester))
    }

    fn prune(&self) {
        for class in [&self.read, &self.heavy_write] {
            class.limiter.retain_recent();
            class.limiter.shrink_to_fit();
        }
    }
}

/// Continuous-refill token bucket, evaluated atomically inside Redis.
///
/// Uses the server clock (`TIME`) so instances with skewed clocks agree.
/// Returns `{allowed, remaining, retry_ms, reset_ms}`.
const TAKE_TOKEN_LUA: &str = r#"
local capacity = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)

local state = redis.call('HMGET', KEYS[1], 'tokens', 'ts')
local tokens = tonumber(state[1])
local ts = tonumber(state[2])
if tokens == nil or ts == nil then
    tokens = capacity
    ts = now
end

tokens = math.min(capacity, tokens + math.max(0, now - ts) * rate)

local allowed = 0
local retry_ms = 0
if tokens >= 1 then
    tokens = tokens - 1
    allowed = 1
else
    retry_ms = math.ceil((1 - tokens) / rate)
end

local reset_ms = math.ceil((capacity - tokens) / rate)
redis.call('HSET', KEYS[1], 'tokens', tostring(tokens), 'ts', now)
redis.call('PEXPIRE', KEYS[1], reset_ms + 1000)

return {allowed, math.floor(tokens), retry_ms, reset_ms}
"#;

/// Buckets shared across instances through Redis.
#[derive(Clone)]
pub struct RedisBucketStore {
    redis: ConnectionManager,
    config: RateLimitConfig,
    script: std::sync::Arc<redis::Script>,
}

impl RedisBucketStore {
    pub fn new(redis: ConnectionManager, config: RateLimitConfig) -> Result<Self, BucketStoreError> {
        for policy in [config.read, config.heavy_write] {
            if policy.capacity == 0 || policy.refill_per_minute == 0 {
                return Err(BucketStoreError::InvalidPolicy(
                    "capacity and refill_per_minute must be > 0".into(),
                ));
            }
        }
        Ok(Self {
            redis,
            config,
            script: std::sync::Arc::new(redis::Script::new(TAKE_TOKEN_LUA)),
        })
    }
}

#[async_trait]
impl BucketStore for RedisBucketStore {
    async fn take(&self, key: &BucketKey) -> Result<RateDecision, BucketStoreError> {
        let policy = self.config.policy(key.class);
        let tokens_per_ms = f64::from(policy.refill_per_minute) / 60_000.0;
        let mut conn = self.redis.clone();

        let (allowed, remaining, retry_ms, reset_ms): (i64, i64, i64, i64) = self
            .script
            .key(key.redis_key())
            .arg(policy.capacity)
            .arg(tokens_per_ms)
            .invoke_async(&mut conn)
            .await?;

        Ok(RateDecision {
            allowed: allowed == 1,
            limit: policy.capacity,
            remaining: remaining.clamp(0, i64::from(policy.capacity)) as u32,
            reset_after: Duration::from_millis(reset_ms.max(0) as u64),
            retry_after: Duration::from_millis(retry_ms.max(0) as u64),
        })
    }
}
