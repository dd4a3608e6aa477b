/// Storage seams for accounts and artifacts
///
/// The HTTP layer and the generation pipeline depend on these traits rather
/// than on a concrete database. Two backends are provided:
///
/// - [`PgStore`]: PostgreSQL via the queries on the model types
/// - [`MemoryStore`]: process-local maps, used in tests and for
///   `APP_ENV=development` runs without a database
///
/// Both backends give the same guarantees: usernames and slugs are unique,
/// the quota increment is atomic against its cap, and the monthly reset
/// happens at most once per month regardless of concurrent callers.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::models::account::{Account, CreateAccount, UpdateAccount};
use crate::models::artifact::{Artifact, ArtifactSummary, CreateArtifact};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// A unique constraint rejected the write (duplicate username or slug)
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    /// Any other database failure
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("unique").to_string();
                return StoreError::Conflict(constraint);
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Account persistence
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Creates a Free account with a zero counter
    ///
    /// Returns [`StoreError::Conflict`] if the username is taken.
    async fn create_account(&self, data: CreateAccount) -> StoreResult<Account>;

    async fn find_account(&self, id: Uuid) -> StoreResult<Option<Account>>;

    async fn find_account_by_username(&self, username: &str) -> StoreResult<Option<Account>>;

    /// Writes the non-None fields of `data`
    async fn update_account(&self, id: Uuid, data: UpdateAccount) -> StoreResult<Option<Account>>;

    /// Zeroes the counter and stamps `last_reset_at = now` if the stored
    /// reset month differs from `now`'s month
    ///
    /// Returns the updated account if the reset happened, None otherwise.
    async fn reset_usage_if_due(&self, id: Uuid, now: DateTime<Utc>)
        -> StoreResult<Option<Account>>;

    /// Atomically increments the counter, refusing to pass `cap`
    ///
    /// Returns the new value, or None if the cap was reached (or the account
    /// is gone).
    async fn increment_generation_count(&self, id: Uuid, cap: Option<i32>)
        -> StoreResult<Option<i32>>;

    /// Gives back one generation, never going below zero
    async fn decrement_generation_count(&self, id: Uuid) -> StoreResult<()>;
}

/// Artifact persistence, always scoped to an owner on read
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Returns [`StoreError::Conflict`] if the slug is already in use
    async fn create_artifact(&self, data: CreateArtifact) -> StoreResult<Artifact>;

    async fn find_owned_artifact(&self, slug: &str, owner_id: Uuid)
        -> StoreResult<Option<Artifact>>;

    /// Returns true if an owned artifact was removed
    async fn delete_owned_artifact(&self, slug: &str, owner_id: Uuid) -> StoreResult<bool>;

    /// Newest first
    async fn list_owned_artifacts(&self, owner_id: Uuid) -> StoreResult<Vec<ArtifactSummary>>;
}
