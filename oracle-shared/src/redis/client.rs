/// Redis client wrapper
///
/// Wraps a [`ConnectionManager`] (which reconnects on its own) and applies a
/// per-command timeout so a stalled Redis cannot hang a request.

use redis::aio::ConnectionManager;
use redis::{Client, FromRedisValue, RedisError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedisClientError {
    #[error("Redis connection error: {0}")]
    ConnectionError(String),

    #[error("Redis command error: {0}")]
    CommandError(String),

    #[error("Redis configuration error: {0}")]
    ConfigError(String),

    #[error("Redis command timed out after {0:?}")]
    Timeout(Duration),
}

impl From<RedisError> for RedisClientError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            RedisClientError::ConnectionError(err.to_string())
        } else {
            RedisClientError::CommandError(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// `redis://[user:pass@]host:port[/db]`
    pub url: String,

    /// Upper bound on a single command round trip
    pub command_timeout_secs: u64,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            command_timeout_secs: 5,
        }
    }

}

#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
    config: Arc<RedisConfig>,
}

impl RedisClient {
    pub async fn new(config: RedisConfig) -> Result<Self, RedisClientError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| RedisClientError::ConfigError(format!("Invalid Redis URL: {}", e)))?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            RedisClientError::ConnectionError(format!("Failed to connect to Redis: {}", e))
        })?;

        tracing::info!(url = %sanitize_url(&config.url), "Redis client connected");

        Ok(Self {
            manager,
            config: Arc::new(config),
        })
    }

    /// Runs one command under the configured timeout
    pub async fn query<T: FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T, RedisClientError> {
        let mut conn = self.manager.clone();
        let timeout = Duration::from_secs(self.config.command_timeout_secs);

        tokio::time::timeout(timeout, cmd.query_async(&mut conn))
            .await
            .map_err(|_| RedisClientError::Timeout(timeout))?
            .map_err(RedisClientError::from)
    }

    /// Runs a Lua script under the configured timeout
    pub async fn invoke_script<T: FromRedisValue>(
        &self,
        invocation: &redis::ScriptInvocation<'_>,
    ) -> Result<T, RedisClientError> {
        let mut conn = self.manager.clone();
        let timeout = Duration::from_secs(self.config.command_timeout_secs);

        tokio::time::timeout(timeout, invocation.invoke_async(&mut conn))
            .await
            .map_err(|_| RedisClientError::Timeout(timeout))?
            .map_err(RedisClientError::from)
    }

    /// PING; true when the server answers PONG
    pub async fn ping(&self) -> Result<bool, RedisClientError> {
        let pong: String = self.query(&redis::cmd("PING")).await?;
        if pong != "PONG" {
            tracing::warn!(response = %pong, "Unexpected PING response");
        }
        Ok(pong == "PONG")
    }

    pub async fn stats(&self) -> RedisStats {
        RedisStats {
            healthy: self.ping().await.unwrap_or(false),
            url: sanitize_url(&self.config.url),
        }
    }
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient")
            .field("url", &sanitize_url(&self.config.url))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisStats {
    pub healthy: bool,

    /// URL with credentials masked
    pub url: String,
}

/// Masks `user:pass@` in a Redis URL for logging
pub fn sanitize_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***:***@{}", &url[..scheme_end + 3], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}
