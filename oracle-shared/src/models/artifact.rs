/// Artifact model and database operations
///
/// An artifact is one generated piece of content owned by exactly one
/// account. It is addressed publicly by its slug, but every lookup, delete
/// and listing is scoped to the owner: a slug that belongs to somebody else
/// behaves exactly like a slug that does not exist.
///
/// `content` (sanitized HTML) and `raw_content` (tag-resolved Markdown) are
/// stored as cipher tokens produced by
/// [`ContentCipher`](crate::crypto::ContentCipher); use
/// [`Artifact::reveal`] to read them back.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE artifacts (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     account_id UUID NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
///     slug VARCHAR(64) NOT NULL UNIQUE,
///     prompt TEXT NOT NULL,
///     title VARCHAR(255) NOT NULL,
///     content TEXT NOT NULL,
///     raw_content TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use crate::crypto::ContentCipher;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const ARTIFACT_COLUMNS: &str = "id, account_id, slug, prompt, title, content, raw_content, created_at";

/// Artifact model, as stored (content fields encrypted)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Artifact {
    pub id: Uuid,

    /// Owning account
    pub account_id: Uuid,

    /// Public identifier, unique across all artifacts
    pub slug: String,

    /// Prompt as submitted
    pub prompt: String,

    pub title: String,

    /// Encrypted sanitized HTML
    pub content: String,

    /// Encrypted tag-resolved Markdown
    pub raw_content: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Decrypted artifact bodies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealedContent {
    pub html: String,
    pub markdown: Option<String>,
}

impl Artifact {
    /// Decrypts both content fields
    ///
    /// Tokens that fail to decrypt come back unchanged.
    pub fn reveal(&self, cipher: &ContentCipher) -> RevealedContent {
        RevealedContent {
            html: cipher
                .decrypt(Some(&self.content))
                .unwrap_or_default(),
            markdown: cipher.decrypt(self.raw_content.as_deref()),
        }
    }
}

/// Input for creating an artifact
///
/// Callers encrypt `content` and `raw_content` before constructing this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateArtifact {
    pub account_id: Uuid,
    pub slug: String,
    pub prompt: String,
    pub title: String,
    pub content: String,
    pub raw_content: Option<String>,
}

/// History entry for an account's dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ArtifactSummary {
    pub title: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Artifact> for ArtifactSummary {
    fn from(artifact: &Artifact) -> Self {
        Self {
            title: artifact.title.clone(),
            slug: artifact.slug.clone(),
            created_at: artifact.created_at,
        }
    }
}

impl Artifact {
    /// Inserts a new artifact
    ///
    /// # Errors
    ///
    /// Fails with a unique violation on `artifacts_slug_key` if the slug is
    /// already in use.
    pub async fn create(pool: &PgPool, data: CreateArtifact) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO artifacts (account_id, slug, prompt, title, content, raw_content)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            ARTIFACT_COLUMNS
        );

        sqlx::query_as::<_, Artifact>(&query)
            .bind(data.account_id)
            .bind(data.slug)
            .bind(data.prompt)
            .bind(data.title)
            .bind(data.content)
            .bind(data.raw_content)
            .fetch_one(pool)
            .await
    }

    /// Finds an artifact by slug, only if `owner_id` owns it
    pub async fn find_owned(
        pool: &PgPool,
        slug: &str,
        owner_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM artifacts WHERE slug = $1 AND account_id = $2",
            ARTIFACT_COLUMNS
        );

        sqlx::query_as::<_, Artifact>(&query)
            .bind(slug)
            .bind(owner_id)
            .fetch_optional(pool)
            .await
    }

    /// Deletes an artifact by slug, only if `owner_id` owns it
    ///
    /// Returns true if a row was removed.
    pub async fn delete_owned(pool: &PgPool, slug: &str, owner_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM artifacts WHERE slug = $1 AND account_id = $2")
            .bind(slug)
            .bind(owner_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists an account's artifacts, newest first
    pub async fn list_summaries(
        pool: &PgPool,
        owner_id: Uuid,
    ) -> Result<Vec<ArtifactSummary>, sqlx::Error> {
        sqlx::query_as::<_, ArtifactSummary>(
            r#"
            SELECT title, slug, created_at
            FROM artifacts
            WHERE account_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> ContentCipher {
        ContentCipher::new([3u8; 32])
    }

    fn artifact(content: String, raw_content: Option<String>) -> Artifact {
        Artifact {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            slug: "a1b2c3d4e5f6".to_string(),
            prompt: "a poem".to_string(),
            title: "Dragons".to_string(),
            content,
            raw_content,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_reveal_decrypts_both_fields() {
        let cipher = cipher();
        let html = cipher.encrypt(Some("<h1>Dragons</h1>")).unwrap();
        let markdown = cipher.encrypt(Some("# Dragons")).unwrap();

        let revealed = artifact(html, Some(markdown)).reveal(&cipher);

        assert_eq!(revealed.html, "<h1>Dragons</h1>");
        assert_eq!(revealed.markdown.as_deref(), Some("# Dragons"));
    }

    #[test]
    fn test_reveal_passes_through_plaintext_rows() {
        let revealed = artifact("<p>legacy</p>".to_string(), None).reveal(&cipher());

        assert_eq!(revealed.html, "<p>legacy</p>");
        assert_eq!(revealed.markdown, None);
    }

    #[test]
    fn test_summary_from_artifact() {
        let a = artifact("x".to_string(), None);
        let summary = ArtifactSummary::from(&a);
        assert_eq!(summary.slug, a.slug);
        assert_eq!(summary.title, "Dragons");
    }
}
