/// In-process store
///
/// Backs tests and database-less development runs. All maps sit behind one
/// async mutex per collection, so each trait call is atomic with respect to
/// every other call on the same collection.

use super::{AccountStore, ArtifactStore, StoreError, StoreResult};
use crate::models::account::{Account, AccountTier, CreateAccount, UpdateAccount};
use crate::models::artifact::{Artifact, ArtifactSummary, CreateArtifact};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: Mutex<HashMap<Uuid, Account>>,
    /// Insertion order doubles as a tiebreak for equal timestamps
    artifacts: Mutex<Vec<Artifact>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts across all owners
    pub async fn artifact_count(&self) -> usize {
        self.artifacts.lock().await.len()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_account(&self, data: CreateAccount) -> StoreResult<Account> {
        let mut accounts = self.accounts.lock().await;

        if accounts.values().any(|a| a.username == data.username) {
            return Err(StoreError::Conflict("accounts_username_key".to_string()));
        }

        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            username: data.username,
            password_hash: data.password_hash,
            tier: AccountTier::Free.as_str().to_string(),
            generation_count: 0,
            last_reset_at: now,
            created_at: now,
            updated_at: now,
        };
        accounts.insert(account.id, account.clone());

        Ok(account)
    }

    async fn find_account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        Ok(self.accounts.lock().await.get(&id).cloned())
    }

    async fn find_account_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        Ok(self
            .accounts
            .lock()
            .await
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn update_account(&self, id: Uuid, data: UpdateAccount) -> StoreResult<Option<Account>> {
        let mut accounts = self.accounts.lock().await;
        let Some(account) = accounts.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(password_hash) = data.password_hash {
            account.password_hash = password_hash;
        }
        if let Some(tier) = data.tier {
            account.tier = tier.as_str().to_string();
        }
        if let Some(count) = data.generation_count {
            account.generation_count = count;
        }
        if let Some(reset_at) = data.last_reset_at {
            account.last_reset_at = reset_at;
        }
        account.updated_at = Utc::now();

        Ok(Some(account.clone()))
    }

    async fn reset_usage_if_due(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Account>> {
        let mut accounts = self.accounts.lock().await;
        match accounts.get_mut(&id) {
            Some(account) if account.usage_reset_due(now) => {
                account.generation_count = 0;
                account.last_reset_at = now;
                account.updated_at = Utc::now();
                Ok(Some(account.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn increment_generation_count(
        &self,
        id: Uuid,
        cap: Option<i32>,
    ) -> StoreResult<Option<i32>> {
        let mut accounts = self.accounts.lock().await;
        let Some(account) = accounts.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(cap) = cap {
            if account.generation_count >= cap {
                return Ok(None);
            }
        }

        account.generation_count += 1;
        account.updated_at = Utc::now();
        Ok(Some(account.generation_count))
    }

    async fn decrement_generation_count(&self, id: Uuid) -> StoreResult<()> {
        if let Some(account) = self.accounts.lock().await.get_mut(&id) {
            account.generation_count = (account.generation_count - 1).max(0);
            account.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn create_artifact(&self, data: CreateArtifact) -> StoreResult<Artifact> {
        let mut artifacts = self.artifacts.lock().await;

        if artifacts.iter().any(|a| a.slug == data.slug) {
            return Err(StoreError::Conflict("artifacts_slug_key".to_string()));
        }

        let artifact = Artifact {
            id: Uuid::new_v4(),
            account_id: data.account_id,
            slug: data.slug,
            prompt: data.prompt,
            title: data.title,
            content: data.content,
            raw_content: data.raw_content,
            created_at: Utc::now(),
        };
        artifacts.push(artifact.clone());

        Ok(artifact)
    }

    async fn find_owned_artifact(
        &self,
        slug: &str,
        owner_id: Uuid,
    ) -> StoreResult<Option<Artifact>> {
        Ok(self
            .artifacts
            .lock()
            .await
            .iter()
            .find(|a| a.slug == slug && a.account_id == owner_id)
            .cloned())
    }

    async fn delete_owned_artifact(&self, slug: &str, owner_id: Uuid) -> StoreResult<bool> {
        let mut artifacts = self.artifacts.lock().await;
        let before = artifacts.len();
        artifacts.retain(|a| !(a.slug == slug && a.account_id == owner_id));
        Ok(artifacts.len() < before)
    }

    async fn list_owned_artifacts(&self, owner_id: Uuid) -> StoreResult<Vec<ArtifactSummary>> {
        let artifacts = self.artifacts.lock().await;
        let mut owned: Vec<ArtifactSummary> = artifacts
            .iter()
            .rev()
            .filter(|a| a.account_id == owner_id)
            .map(ArtifactSummary::from)
            .collect();
        // stable: equal timestamps keep newest-inserted first
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }
}
