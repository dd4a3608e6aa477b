/// Redis integration
///
/// Redis is optional. When `REDIS_URL` is configured it backs the session
/// store and the request rate limiter so that both survive restarts and are
/// shared between instances:
///
/// ```text
/// sess:{session_id}   SETEX 86400 -> account id
/// ratelimit:{scope}:{ip}  HASH {tokens, last_refill} with TTL
/// ```
///
/// # Example
///
/// ```no_run
/// use oracle_shared::redis::{RedisClient, RedisConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RedisClient::new(RedisConfig::new("redis://localhost:6379")).await?;
/// assert!(client.ping().await?);
/// # Ok(())
/// # }
/// ```

pub mod client;

pub use client::{sanitize_url, RedisClient, RedisClientError, RedisConfig, RedisStats};
