/// Rate limiting middleware
///
/// Token buckets keyed by caller IP, one bucket family per scope:
///
/// - **Global**: 3000 requests / 15 minutes, every route
/// - **Login**: 500 attempts / hour, `POST /login`
/// - **Generation**: 2000 generations / hour, both generation endpoints
///
/// # Algorithm
///
/// - Tokens refill continuously at `capacity / window`
/// - Each request consumes 1 token
/// - Request blocked if bucket empty; `Retry-After` says when one token is back
///
/// # Storage
///
/// With Redis the bucket lives at `ratelimit:{scope}:{ip}` and is updated by
/// one atomic Lua script; the key expires once the bucket would be full
/// again. Without Redis the buckets live in process memory.
///
/// If Redis fails the request is let through and a warning logged.
///
/// # Example
///
/// ```no_run
/// use oracle_api::app::AppState;
/// use oracle_api::middleware::rate_limit::login_rate_limit;
/// use axum::{Router, routing::post};
///
/// # fn example(state: AppState) -> Router<AppState> {
/// Router::new()
///     .route("/login", post(handler))
///     .route_layer(axum::middleware::from_fn_with_state(state, login_rate_limit))
/// # }
/// # async fn handler() {}
/// ```

use crate::app::AppState;
use crate::error::ApiError;
use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use oracle_shared::redis::{RedisClient, RedisClientError};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// Bucket size and refill window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    /// Maximum tokens in bucket (burst capacity)
    pub capacity: u32,

    /// Time for an empty bucket to refill completely
    pub window: Duration,
}

impl RateLimit {
    /// Token refill rate (tokens per second)
    pub fn refill_rate(&self) -> f64 {
        self.capacity as f64 / self.window.as_secs_f64()
    }
}

/// Which bucket family a request draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    Global,
    Login,
    Generation,
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::Global => "global",
            RateLimitScope::Login => "login",
            RateLimitScope::Generation => "generation",
        }
    }

    pub fn limit(&self) -> RateLimit {
        match self {
            RateLimitScope::Global => RateLimit {
                capacity: 3000,
                window: Duration::from_secs(15 * 60),
            },
            RateLimitScope::Login => RateLimit {
                capacity: 500,
                window: Duration::from_secs(60 * 60),
            },
            RateLimitScope::Generation => RateLimit {
                capacity: 2000,
                window: Duration::from_secs(60 * 60),
            },
        }
    }

    fn message(&self) -> &'static str {
        match self {
            RateLimitScope::Global => "Too many requests, please try again later.",
            RateLimitScope::Login => "Too many login attempts, please try again later.",
            RateLimitScope::Generation => "Generation rate limit exceeded, please try again later.",
        }
    }
}

/// Result of rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether request is allowed
    pub allowed: bool,

    /// Tokens remaining
    pub remaining: u32,

    /// Seconds until the next token, zero when allowed
    pub retry_after: u64,
}

/// Rate limiter backend
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Takes one token from `client`'s bucket in `scope`
    async fn check(
        &self,
        scope: RateLimitScope,
        client: &str,
    ) -> Result<RateLimitDecision, RedisClientError>;
}

/// Token bucket state
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, now: Instant) -> Self {
        TokenBucket {
            tokens: capacity as f64,
            last_refill: now,
        }
    }

    /// Refills tokens based on elapsed time
    fn refill(&mut self, rate: f64, capacity: u32, now: Instant) {
        let elapsed_secs = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed_secs * rate).min(capacity as f64);
        self.last_refill = now;
    }

    fn try_consume(&mut self, count: f64) -> bool {
        if self.tokens >= count {
            self.tokens -= count;
            true
        } else {
            false
        }
    }

    /// Calculates seconds until N tokens available
    fn seconds_until_available(&self, count: f64, rate: f64) -> u64 {
        let deficit = count - self.tokens;
        if deficit <= 0.0 {
            0
        } else {
            (deficit / rate).ceil() as u64
        }
    }
}

/// In-process buckets
#[derive(Debug, Default)]
pub struct MemoryRateLimiter {
    buckets: Mutex<HashMap<(RateLimitScope, String), TokenBucket>>,
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    async fn check_at(
        &self,
        scope: RateLimitScope,
        client: &str,
        now: Instant,
    ) -> RateLimitDecision {
        let limit = scope.limit();
        let rate = limit.refill_rate();

        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry((scope, client.to_string()))
            .or_insert_with(|| TokenBucket::new(limit.capacity, now));

        bucket.refill(rate, limit.capacity, now);
        let allowed = bucket.try_consume(1.0);

        RateLimitDecision {
            allowed,
            remaining: bucket.tokens.floor().max(0.0) as u32,
            retry_after: if allowed {
                0
            } else {
                bucket.seconds_until_available(1.0, rate).max(1)
            },
        }
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn check(
        &self,
        scope: RateLimitScope,
        client: &str,
    ) -> Result<RateLimitDecision, RedisClientError> {
        Ok(self.check_at(scope, client, Instant::now()).await)
    }
}

/// Atomic token bucket update
///
/// KEYS[1] bucket key; ARGV capacity, refill rate (tokens/s), now (ms).
/// Returns {allowed, remaining, retry_after_secs}.
const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])

local bucket = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(bucket[1])
local last_refill = tonumber(bucket[2])

if not tokens then
    tokens = capacity
    last_refill = now
end

local elapsed = math.max(0, now - last_refill) / 1000
tokens = math.min(capacity, tokens + (elapsed * refill_rate))

local ttl = math.ceil(capacity / refill_rate) + 1

if tokens >= 1 then
    tokens = tokens - 1
    redis.call('HSET', key, 'tokens', tokens, 'last_refill', now)
    redis.call('EXPIRE', key, ttl)
    return {1, math.floor(tokens), 0}
else
    redis.call('HSET', key, 'tokens', tokens, 'last_refill', now)
    redis.call('EXPIRE', key, ttl)
    return {0, 0, math.max(1, math.ceil((1 - tokens) / refill_rate))}
end
"#;

/// Buckets shared through Redis
pub struct RedisRateLimiter {
    client: RedisClient,
    script: redis::Script,
}

impl RedisRateLimiter {
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            script: redis::Script::new(TOKEN_BUCKET_SCRIPT),
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(
        &self,
        scope: RateLimitScope,
        client: &str,
    ) -> Result<RateLimitDecision, RedisClientError> {
        let limit = scope.limit();
        let key = format!("ratelimit:{}:{}", scope.as_str(), client);
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let mut invocation = self.script.key(&key);
        invocation
            .arg(limit.capacity)
            .arg(limit.refill_rate())
            .arg(now_ms);

        let result: Vec<i64> = self.client.invoke_script(&invocation).await?;

        let field = |i: usize| result.get(i).copied().unwrap_or(0).max(0);
        Ok(RateLimitDecision {
            allowed: field(0) == 1,
            remaining: field(1) as u32,
            retry_after: field(2) as u64,
        })
    }
}

/// Caller IP: first `X-Forwarded-For` hop, else the socket address
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|hop| hop.trim().to_string())
        .filter(|hop| !hop.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Caller IP of a request
pub fn request_ip(request: &Request) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    client_ip(request.headers(), peer)
}

async fn enforce(state: &AppState, scope: RateLimitScope, request: Request, next: Next) -> Response {
    let ip = request_ip(&request);

    match state.rate_limiter.check(scope, &ip).await {
        Ok(decision) if !decision.allowed => {
            tracing::warn!(
                scope = scope.as_str(),
                ip = %ip,
                retry_after = decision.retry_after,
                "Rate limit exceeded"
            );
            return ApiError::RateLimitExceeded {
                retry_after: decision.retry_after,
                message: scope.message().to_string(),
            }
            .into_response();
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(scope = scope.as_str(), error = %e, "Rate limiter unavailable, allowing request");
        }
    }

    next.run(request).await
}

/// Global limit, applied to every route
pub async fn global_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    enforce(&state, RateLimitScope::Global, request, next).await
}

/// Login attempt limit
pub async fn login_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    enforce(&state, RateLimitScope::Login, request, next).await
}

/// Generation limit
pub async fn generation_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    enforce(&state, RateLimitScope::Generation, request, next).await
}
