/// API route handlers
///
/// Page routes answer with JSON representations of what the page shows.
///
/// - `health`: health check
/// - `auth`: register, login, logout
/// - `generate`: buffered and streaming generation
/// - `posts`: dashboard, artifact view, download, delete
/// - `billing`: pricing, checkout, mock payment
/// - `settings`: account summary and password change

pub mod auth;
pub mod billing;
pub mod generate;
pub mod health;
pub mod posts;
pub mod settings;

use chrono::{DateTime, Utc};
use oracle_shared::models::account::Account;
use oracle_shared::quota::QuotaCheckResult;
use serde::Serialize;

/// Account as shown on the dashboard and settings pages
#[derive(Debug, Serialize)]
pub struct AccountSummary {
    pub username: String,
    pub tier: String,
    pub generation_count: u32,

    /// None for unlimited tiers
    pub generation_limit: Option<u32>,
    pub remaining: Option<u32>,
    pub last_reset_at: DateTime<Utc>,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        let quota = QuotaCheckResult::for_account(account);
        Self {
            username: account.username.clone(),
            tier: account.get_tier().to_string(),
            generation_count: quota.current,
            generation_limit: quota.limit,
            remaining: quota.remaining,
            last_reset_at: account.last_reset_at,
        }
    }
}
