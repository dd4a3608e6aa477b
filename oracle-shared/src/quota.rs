/// Monthly generation quota
///
/// Free accounts may generate [`FREE_MONTHLY_GENERATIONS`] artifacts per
/// calendar month; Premium and Plus are unlimited. The counter is reset
/// lazily the first time an account is seen in a new month.
///
/// Admission is a reservation: [`QuotaEnforcer::reserve`] increments the
/// counter atomically against the cap before any model work starts, and
/// [`QuotaEnforcer::release`] gives the slot back if the generation fails.
/// Two concurrent requests at 9/10 therefore cannot both pass.
///
/// # Example
///
/// ```no_run
/// use oracle_shared::quota::QuotaEnforcer;
/// use oracle_shared::models::account::Account;
/// use oracle_shared::store::AccountStore;
/// use std::sync::Arc;
///
/// # async fn example(store: Arc<dyn AccountStore>, account: Account) -> Result<(), Box<dyn std::error::Error>> {
/// let enforcer = QuotaEnforcer::new(store);
/// let account = enforcer.refresh(account, chrono::Utc::now()).await?;
///
/// let used = enforcer.reserve(&account).await?;
/// println!("generation {} this month", used);
/// # Ok(())
/// # }
/// ```

use crate::models::account::{Account, AccountTier};
use crate::store::{AccountStore, StoreError};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Generations a Free account gets per calendar month
pub const FREE_MONTHLY_GENERATIONS: u32 = 10;

/// Quota enforcement error
#[derive(Debug)]
pub enum QuotaError {
    /// Monthly limit reached
    LimitExceeded { limit: u32, current: u32 },

    /// Storage failure
    Store(StoreError),

    /// Account vanished between load and reservation
    AccountNotFound(Uuid),
}

impl fmt::Display for QuotaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaError::LimitExceeded { limit, current } => {
                write!(f, "Monthly generation limit exceeded ({}/{})", current, limit)
            }
            QuotaError::Store(err) => write!(f, "Quota store error: {}", err),
            QuotaError::AccountNotFound(id) => write!(f, "Account not found: {}", id),
        }
    }
}

impl std::error::Error for QuotaError {}

impl From<StoreError> for QuotaError {
    fn from(err: StoreError) -> Self {
        QuotaError::Store(err)
    }
}

/// Per-tier limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    /// None means unlimited
    pub monthly_generations: Option<u32>,
}

impl QuotaLimits {
    pub fn for_tier(tier: AccountTier) -> Self {
        match tier {
            AccountTier::Free => QuotaLimits {
                monthly_generations: Some(FREE_MONTHLY_GENERATIONS),
            },
            AccountTier::Premium | AccountTier::Plus => QuotaLimits {
                monthly_generations: None,
            },
        }
    }
}

/// Result of a quota check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaCheckResult {
    pub allowed: bool,
    pub current: u32,
    pub limit: Option<u32>,
    /// None when unlimited
    pub remaining: Option<u32>,
}

impl QuotaCheckResult {
    pub fn allowed(current: u32, limit: Option<u32>) -> Self {
        QuotaCheckResult {
            allowed: true,
            current,
            limit,
            remaining: limit.map(|l| l.saturating_sub(current)),
        }
    }

    pub fn exceeded(current: u32, limit: u32) -> Self {
        QuotaCheckResult {
            allowed: false,
            current,
            limit: Some(limit),
            remaining: Some(0),
        }
    }

    /// Checks an account snapshot without touching storage
    pub fn for_account(account: &Account) -> Self {
        let current = account.generation_count.max(0) as u32;
        match QuotaLimits::for_tier(account.get_tier()).monthly_generations {
            Some(limit) if current >= limit => Self::exceeded(current, limit),
            limit => Self::allowed(current, limit),
        }
    }
}

/// Applies the lazy monthly reset and reserves generations
#[derive(Clone)]
pub struct QuotaEnforcer {
    accounts: Arc<dyn AccountStore>,
}

impl QuotaEnforcer {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        QuotaEnforcer { accounts }
    }

    /// Returns the account with its counter reset if a new month started
    ///
    /// When another request performs the reset first, the fresh row is
    /// re-read so the caller never sees a stale counter.
    pub async fn refresh(&self, account: Account, now: DateTime<Utc>) -> Result<Account, QuotaError> {
        if !account.usage_reset_due(now) {
            return Ok(account);
        }

        if let Some(reset) = self.accounts.reset_usage_if_due(account.id, now).await? {
            tracing::info!(account_id = %reset.id, "Monthly generation counter reset");
            return Ok(reset);
        }

        self.accounts
            .find_account(account.id)
            .await?
            .ok_or(QuotaError::AccountNotFound(account.id))
    }

    /// Reserves one generation for `account`
    ///
    /// Returns the counter value after the increment.
    ///
    /// # Errors
    ///
    /// [`QuotaError::LimitExceeded`] when the tier's cap is reached; the
    /// counter is left untouched in that case.
    pub async fn reserve(&self, account: &Account) -> Result<u32, QuotaError> {
        let limit = QuotaLimits::for_tier(account.get_tier()).monthly_generations;

        let check = QuotaCheckResult::for_account(account);
        if let (false, Some(limit)) = (check.allowed, limit) {
            return Err(QuotaError::LimitExceeded {
                limit,
                current: check.current,
            });
        }

        let cap = limit.map(|l| l as i32);
        match self.accounts.increment_generation_count(account.id, cap).await? {
            Some(count) => Ok(count.max(0) as u32),
            None => match limit {
                Some(limit) => Err(QuotaError::LimitExceeded {
                    limit,
                    current: limit,
                }),
                None => Err(QuotaError::AccountNotFound(account.id)),
            },
        }
    }

    /// Returns a reserved generation
    pub async fn release(&self, account_id: Uuid) -> Result<(), QuotaError> {
        self.accounts.decrement_generation_count(account_id).await?;
        Ok(())
    }
}
