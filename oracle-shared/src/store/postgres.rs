/// PostgreSQL-backed store

use super::{AccountStore, ArtifactStore, StoreResult};
use crate::models::account::{Account, CreateAccount, UpdateAccount};
use crate::models::artifact::{Artifact, ArtifactSummary, CreateArtifact};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Store over a shared connection pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn create_account(&self, data: CreateAccount) -> StoreResult<Account> {
        Ok(Account::create(&self.pool, data).await?)
    }

    async fn find_account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        Ok(Account::find_by_id(&self.pool, id).await?)
    }

    async fn find_account_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        Ok(Account::find_by_username(&self.pool, username).await?)
    }

    async fn update_account(&self, id: Uuid, data: UpdateAccount) -> StoreResult<Option<Account>> {
        Ok(Account::update(&self.pool, id, data).await?)
    }

    async fn reset_usage_if_due(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Account>> {
        Ok(Account::reset_usage_if_due(&self.pool, id, now).await?)
    }

    async fn increment_generation_count(
        &self,
        id: Uuid,
        cap: Option<i32>,
    ) -> StoreResult<Option<i32>> {
        Ok(Account::increment_generation_count(&self.pool, id, cap).await?)
    }

    async fn decrement_generation_count(&self, id: Uuid) -> StoreResult<()> {
        Account::decrement_generation_count(&self.pool, id).await?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for PgStore {
    async fn create_artifact(&self, data: CreateArtifact) -> StoreResult<Artifact> {
        Ok(Artifact::create(&self.pool, data).await?)
    }

    async fn find_owned_artifact(
        &self,
        slug: &str,
        owner_id: Uuid,
    ) -> StoreResult<Option<Artifact>> {
        Ok(Artifact::find_owned(&self.pool, slug, owner_id).await?)
    }

    async fn delete_owned_artifact(&self, slug: &str, owner_id: Uuid) -> StoreResult<bool> {
        Ok(Artifact::delete_owned(&self.pool, slug, owner_id).await?)
    }

    async fn list_owned_artifacts(&self, owner_id: Uuid) -> StoreResult<Vec<ArtifactSummary>> {
        Ok(Artifact::list_summaries(&self.pool, owner_id).await?)
    }
}
