/// Account model and database operations
///
/// An account is a login identity with a subscription tier and a monthly
/// generation counter. The counter is reset lazily: whenever an account is
/// loaded for a request, the month/year of its last reset is compared with
/// the current month/year (see [`Account::usage_reset_due`]).
///
/// # Schema
///
/// ```sql
/// CREATE TABLE accounts (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     username VARCHAR(50) NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     tier VARCHAR(20) NOT NULL DEFAULT 'Free',
///     generation_count INTEGER NOT NULL DEFAULT 0,
///     last_reset_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use oracle_shared::models::account::{Account, CreateAccount};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let account = Account::create(
///     &pool,
///     CreateAccount {
///         username: "merlin".to_string(),
///         password_hash: "$argon2id$...".to_string(),
///     },
/// )
/// .await?;
///
/// assert_eq!(account.generation_count, 0);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str =
    "id, username, password_hash, tier, generation_count, last_reset_at, created_at, updated_at";

/// Subscription tiers
///
/// Stored as the capitalized tier name (`Free`, `Premium`, `Plus`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountTier {
    /// Default tier, capped at a fixed number of generations per month
    Free,

    /// Paid tier
    Premium,

    /// Paid tier
    Plus,
}

impl AccountTier {
    /// Converts tier to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountTier::Free => "Free",
            AccountTier::Premium => "Premium",
            AccountTier::Plus => "Plus",
        }
    }

    /// Parses a stored tier name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Free" => Some(AccountTier::Free),
            "Premium" => Some(AccountTier::Premium),
            "Plus" => Some(AccountTier::Plus),
            _ => None,
        }
    }

    /// Parses a billing plan identifier such as `premium`
    ///
    /// The first character is upper-cased before matching, so `premium`
    /// and `Premium` both map to [`AccountTier::Premium`].
    pub fn from_plan(plan: &str) -> Option<Self> {
        let mut chars = plan.trim().chars();
        let first = chars.next()?;
        let capitalized: String = first.to_uppercase().chain(chars).collect();
        Self::parse(&capitalized)
    }

    /// All tiers, cheapest first
    pub fn all() -> [AccountTier; 3] {
        [AccountTier::Free, AccountTier::Premium, AccountTier::Plus]
    }
}

impl std::fmt::Display for AccountTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    /// Unique account ID
    pub id: Uuid,

    /// Unique login handle
    pub username: String,

    /// Argon2id password hash
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// Stored tier name, see [`Account::get_tier`]
    pub tier: String,

    /// Generations used in the current month
    pub generation_count: i32,

    /// When the generation counter was last reset
    pub last_reset_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Gets the parsed tier
    ///
    /// Unknown stored values are treated as Free.
    pub fn get_tier(&self) -> AccountTier {
        AccountTier::parse(&self.tier).unwrap_or(AccountTier::Free)
    }

    /// Whether the monthly counter must be reset at `now`
    ///
    /// True exactly when the calendar month or year of `now` differs from
    /// that of `last_reset_at` (both in UTC).
    pub fn usage_reset_due(&self, now: DateTime<Utc>) -> bool {
        now.month() != self.last_reset_at.month() || now.year() != self.last_reset_at.year()
    }
}

/// Input for creating a new account
///
/// New accounts start on the Free tier with a zero counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccount {
    pub username: String,

    /// Argon2id password hash (NOT the plaintext password)
    pub password_hash: String,
}

/// Input for updating an existing account
///
/// Only non-None fields are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAccount {
    pub password_hash: Option<String>,
    pub tier: Option<AccountTier>,
    pub generation_count: Option<i32>,
    pub last_reset_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Creates a new account
    ///
    /// # Errors
    ///
    /// Fails with a unique violation on `accounts_username_key` if the
    /// username is already taken.
    pub async fn create(pool: &PgPool, data: CreateAccount) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO accounts (username, password_hash) VALUES ($1, $2) RETURNING {}",
            ACCOUNT_COLUMNS
        );

        sqlx::query_as::<_, Account>(&query)
            .bind(data.username)
            .bind(data.password_hash)
            .fetch_one(pool)
            .await
    }

    /// Finds an account by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);

        sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds an account by its unique username
    pub async fn find_by_username(
        pool: &PgPool,
        username: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM accounts WHERE username = $1", ACCOUNT_COLUMNS);

        sqlx::query_as::<_, Account>(&query)
            .bind(username)
            .fetch_optional(pool)
            .await
    }

    /// Updates the given subset of fields
    ///
    /// Returns None if the account does not exist.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateAccount,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE accounts SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.password_hash.is_some() {
            bind_count += 1;
            query.push_str(&format!(", password_hash = ${}", bind_count));
        }
        if data.tier.is_some() {
            bind_count += 1;
            query.push_str(&format!(", tier = ${}", bind_count));
        }
        if data.generation_count.is_some() {
            bind_count += 1;
            query.push_str(&format!(", generation_count = ${}", bind_count));
        }
        if data.last_reset_at.is_some() {
            bind_count += 1;
            query.push_str(&format!(", last_reset_at = ${}", bind_count));
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {}", ACCOUNT_COLUMNS));

        let mut q = sqlx::query_as::<_, Account>(&query).bind(id);

        if let Some(password_hash) = data.password_hash {
            q = q.bind(password_hash);
        }
        if let Some(tier) = data.tier {
            q = q.bind(tier.as_str());
        }
        if let Some(count) = data.generation_count {
            q = q.bind(count);
        }
        if let Some(reset_at) = data.last_reset_at {
            q = q.bind(reset_at);
        }

        q.fetch_optional(pool).await
    }

    /// Resets the monthly counter if the stored reset month differs from `now`
    ///
    /// The month comparison happens inside the UPDATE, so concurrent callers
    /// reset at most once. Returns the updated account when a reset happened.
    pub async fn reset_usage_if_due(
        pool: &PgPool,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE accounts
            SET generation_count = 0, last_reset_at = $2, updated_at = NOW()
            WHERE id = $1
              AND date_trunc('month', last_reset_at AT TIME ZONE 'UTC')
                  <> date_trunc('month', $2 AT TIME ZONE 'UTC')
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );

        sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    /// Atomically increments the generation counter
    ///
    /// With `cap = Some(n)` the increment only happens while the counter is
    /// below `n`. Returns the new counter value, or None when the cap was hit
    /// or the account does not exist.
    pub async fn increment_generation_count(
        pool: &PgPool,
        id: Uuid,
        cap: Option<i32>,
    ) -> Result<Option<i32>, sqlx::Error> {
        sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE accounts
            SET generation_count = generation_count + 1, updated_at = NOW()
            WHERE id = $1 AND ($2::INTEGER IS NULL OR generation_count < $2)
            RETURNING generation_count
            "#,
        )
        .bind(id)
        .bind(cap)
        .fetch_optional(pool)
        .await
    }

    /// Decrements the generation counter, never below zero
    pub async fn decrement_generation_count(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET generation_count = GREATEST(generation_count - 1, 0), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn account_reset_at(last_reset_at: DateTime<Utc>) -> Account {
        Account {
            id: Uuid::new_v4(),
            username: "merlin".to_string(),
            password_hash: "hash".to_string(),
            tier: "Free".to_string(),
            generation_count: 7,
            last_reset_at,
            created_at: last_reset_at,
            updated_at: last_reset_at,
        }
    }

    #[test]
    fn test_tier_roundtrip_names() {
        for tier in AccountTier::all() {
            assert_eq!(AccountTier::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(AccountTier::parse("free"), None);
    }

    #[test]
    fn test_tier_from_plan_capitalizes() {
        assert_eq!(AccountTier::from_plan("premium"), Some(AccountTier::Premium));
        assert_eq!(AccountTier::from_plan("plus"), Some(AccountTier::Plus));
        assert_eq!(AccountTier::from_plan("Free"), Some(AccountTier::Free));
        assert_eq!(AccountTier::from_plan("gold"), None);
        assert_eq!(AccountTier::from_plan(""), None);
    }

    #[test]
    fn test_unknown_stored_tier_is_free() {
        let mut account = account_reset_at(Utc::now());
        account.tier = "Legacy".to_string();
        assert_eq!(account.get_tier(), AccountTier::Free);
    }

    #[test]
    fn test_usage_reset_not_due_within_same_month() {
        let account = account_reset_at(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        let now = Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 59).unwrap();
        assert!(!account.usage_reset_due(now));
    }

    #[test]
    fn test_usage_reset_due_next_month() {
        let account = account_reset_at(Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 59).unwrap());
        let now = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();
        assert!(account.usage_reset_due(now));
    }

    #[test]
    fn test_usage_reset_due_same_month_other_year() {
        let account = account_reset_at(Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap());
        let now = Utc.with_ymd_and_hms(2026, 6, 10, 12, 0, 0).unwrap();
        assert!(account.usage_reset_due(now));
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let account = account_reset_at(Utc::now());
        let json = serde_json::to_string(&account).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(json.contains("\"generation_count\":7"));
    }

    #[test]
    fn test_update_account_default() {
        let update = UpdateAccount::default();
        assert!(update.password_hash.is_none());
        assert!(update.tier.is_none());
        assert!(update.generation_count.is_none());
        assert!(update.last_reset_at.is_none());
    }
}
