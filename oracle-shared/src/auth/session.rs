/// Server-side sessions
///
/// A session is an opaque random ID mapped to an account ID with a fixed
/// lifetime. The browser only ever holds `{session_id}.{signature}`, where
/// the signature is HMAC-SHA256 of the ID under the server's session secret;
/// cookies with a bad signature are ignored without touching the store.
///
/// Two stores implement [`SessionStore`]:
///
/// - [`RedisSessionStore`]: `SETEX sess:{id} {ttl} {account_id}`
/// - [`MemorySessionStore`]: a process-local map with expiry instants

use crate::redis::{RedisClient, RedisClientError};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Cookie name carrying the signed session ID
pub const SESSION_COOKIE_NAME: &str = "oracle.sid";

/// Session lifetime (24 hours)
pub const SESSION_TTL: Duration = Duration::from_secs(86_400);

const SESSION_KEY_PREFIX: &str = "sess:";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session backend error: {0}")]
    Backend(#[from] RedisClientError),

    #[error("Corrupt session record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Starts a session for `account_id` and returns its ID
    async fn create(&self, account_id: Uuid) -> Result<String, SessionError>;

    /// Looks up a live session
    async fn resolve(&self, session_id: &str) -> Result<Option<Uuid>, SessionError>;

    /// Ends a session; unknown IDs are not an error
    async fn destroy(&self, session_id: &str) -> Result<(), SessionError>;
}

/// 32 random bytes, hex encoded
pub fn new_session_id() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Signs and verifies session cookie values
#[derive(Clone)]
pub struct SessionSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner").finish_non_exhaustive()
    }
}

impl SessionSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"))
    }

    /// Returns `{session_id}.{hex hmac}`
    pub fn sign(&self, session_id: &str) -> String {
        let mut mac = self.mac();
        mac.update(session_id.as_bytes());
        format!("{}.{}", session_id, hex::encode(mac.finalize().into_bytes()))
    }

    /// Returns the session ID if the signature checks out
    pub fn verify(&self, cookie_value: &str) -> Option<String> {
        let (session_id, signature) = cookie_value.rsplit_once('.')?;
        let signature = hex::decode(signature).ok()?;

        let mut mac = self.mac();
        mac.update(session_id.as_bytes());
        mac.verify_slice(&signature).ok()?;

        Some(session_id.to_string())
    }
}

/// Sessions in Redis with server-side expiry
#[derive(Debug, Clone)]
pub struct RedisSessionStore {
    client: RedisClient,
    ttl: Duration,
}

impl RedisSessionStore {
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            ttl: SESSION_TTL,
        }
    }

    fn key(session_id: &str) -> String {
        format!("{}{}", SESSION_KEY_PREFIX, session_id)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, account_id: Uuid) -> Result<String, SessionError> {
        let session_id = new_session_id();

        let mut cmd = redis::cmd("SETEX");
        cmd.arg(Self::key(&session_id))
            .arg(self.ttl.as_secs())
            .arg(account_id.to_string());
        self.client.query::<()>(&cmd).await?;

        Ok(session_id)
    }

    async fn resolve(&self, session_id: &str) -> Result<Option<Uuid>, SessionError> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(Self::key(session_id));
        let value: Option<String> = self.client.query(&cmd).await?;

        value
            .map(|raw| Uuid::parse_str(&raw).map_err(|e| SessionError::Corrupt(e.to_string())))
            .transpose()
    }

    async fn destroy(&self, session_id: &str) -> Result<(), SessionError> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(Self::key(session_id));
        self.client.query::<i64>(&cmd).await?;
        Ok(())
    }
}

/// Sessions in process memory
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, (Uuid, Instant)>>,
    ttl: Duration,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::with_ttl(SESSION_TTL)
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, account_id: Uuid) -> Result<String, SessionError> {
        let session_id = new_session_id();
        let mut sessions = self.sessions.lock().await;

        let now = Instant::now();
        sessions.retain(|_, (_, expires)| *expires > now);
        sessions.insert(session_id.clone(), (account_id, now + self.ttl));

        Ok(session_id)
    }

    async fn resolve(&self, session_id: &str) -> Result<Option<Uuid>, SessionError> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(session_id) {
            Some((account_id, expires)) if *expires > Instant::now() => Ok(Some(*account_id)),
            Some(_) => {
                sessions.remove(session_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn destroy(&self, session_id: &str) -> Result<(), SessionError> {
        self.sessions.lock().await.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_session_ids_are_random_hex() {
        let a = new_session_id();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, new_session_id());
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = SessionSigner::new(SECRET);
        let cookie = signer.sign("abc");

        assert!(cookie.starts_with("abc."));
        assert_eq!(signer.verify(&cookie).as_deref(), Some("abc"));
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let signer = SessionSigner::new(SECRET);
        let cookie = signer.sign("abc");

        assert_eq!(signer.verify(&cookie.replacen("abc", "abd", 1)), None);
        assert_eq!(signer.verify("abc"), None);
        assert_eq!(signer.verify("abc.zz"), None);
        assert_eq!(SessionSigner::new("another secret entirely......").verify(&cookie), None);
    }

    #[tokio::test]
    async fn test_memory_store_lifecycle() {
        let store = MemorySessionStore::new();
        let account_id = Uuid::new_v4();

        let sid = store.create(account_id).await.unwrap();
        assert_eq!(store.resolve(&sid).await.unwrap(), Some(account_id));

        store.destroy(&sid).await.unwrap();
        assert_eq!(store.resolve(&sid).await.unwrap(), None);
        store.destroy(&sid).await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_expiry() {
        let store = MemorySessionStore::with_ttl(Duration::from_millis(20));
        let sid = store.create(Uuid::new_v4()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.resolve(&sid).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn test_redis_store_lifecycle() {
        use crate::redis::RedisConfig;

        let client = RedisClient::new(RedisConfig::new("redis://localhost:6379"))
            .await
            .unwrap();
        let store = RedisSessionStore::new(client);
        let account_id = Uuid::new_v4();

        let sid = store.create(account_id).await.unwrap();
        assert_eq!(store.resolve(&sid).await.unwrap(), Some(account_id));
        store.destroy(&sid).await.unwrap();
        assert_eq!(store.resolve(&sid).await.unwrap(), None);
    }
}
