/// Generation pipeline
///
/// ```text
/// admit ──> invoke model ──> resolve image tags ──> render + sanitize
///   │            │                                        │
///   │            └─ fragments ─> sink (streaming)         ▼
///   │                                          encrypt ──> persist ──> sink.finished
///   └─ limit reached: nothing else happens
/// ```
///
/// Admission reserves one generation up front with an atomic capped
/// increment (see [`QuotaEnforcer`]). Every failure after admission gives
/// the reservation back and reports through [`OutputSink::failed`]; the
/// artifact row is written last, so a failed run leaves nothing behind.
///
/// # Example
///
/// ```no_run
/// use oracle_generator::pipeline::GenerationPipeline;
/// use oracle_generator::sink::BufferedSink;
/// # use oracle_shared::models::account::Account;
///
/// # async fn example(pipeline: GenerationPipeline, account: Account) -> Result<(), Box<dyn std::error::Error>> {
/// let reservation = pipeline.admit(&account).await?;
///
/// let mut sink = BufferedSink::new();
/// let artifact = pipeline.run(reservation, "a limerick about Rust", &mut sink).await?;
/// println!("/post/{}", artifact.slug);
/// # Ok(())
/// # }
/// ```

use crate::images::ImageLookup;
use crate::model::{ContentModel, ModelError};
use crate::prompt::build_instruction;
use crate::render::{derive_title, generate_slug, render_markdown};
use crate::sink::{InvocationMode, OutputSink};
use crate::tags::resolve_image_tags;
use crate::timeout::DEFAULT_MODEL_TIMEOUT;
use futures::StreamExt;
use oracle_shared::crypto::ContentCipher;
use oracle_shared::models::account::Account;
use oracle_shared::models::artifact::CreateArtifact;
use oracle_shared::quota::{QuotaEnforcer, QuotaError};
use oracle_shared::store::{AccountStore, ArtifactStore, StoreError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum GenerationError {
    /// The account's monthly allowance is used up
    #[error("Monthly generation limit reached ({current}/{limit})")]
    LimitReached { limit: u32, current: u32 },

    #[error("Quota check failed: {0}")]
    Quota(QuotaError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Model produced no content")]
    EmptyOutput,

    #[error("Failed to store artifact: {0}")]
    Store(#[from] StoreError),
}

impl From<QuotaError> for GenerationError {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::LimitExceeded { limit, current } => {
                GenerationError::LimitReached { limit, current }
            }
            other => GenerationError::Quota(other),
        }
    }
}

impl GenerationError {
    pub fn is_limit_reached(&self) -> bool {
        matches!(self, GenerationError::LimitReached { .. })
    }
}

/// One admitted generation
///
/// Obtained from [`GenerationPipeline::admit`] and consumed by
/// [`GenerationPipeline::run`].
#[must_use = "a reservation holds a generation slot until it is run"]
#[derive(Debug)]
pub struct Reservation {
    account_id: Uuid,
    generation_count: u32,
}

impl Reservation {
    pub fn account_id(&self) -> Uuid {
        self.account_id
    }

    /// Counter value including this generation
    pub fn generation_count(&self) -> u32 {
        self.generation_count
    }
}

/// A persisted generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    pub slug: String,
    pub title: String,
    pub generation_count: u32,
}

pub struct GenerationPipeline {
    quota: QuotaEnforcer,
    artifacts: Arc<dyn ArtifactStore>,
    cipher: ContentCipher,
    model: Arc<dyn ContentModel>,
    images: Arc<dyn ImageLookup>,
    model_timeout: Duration,
}

impl GenerationPipeline {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        artifacts: Arc<dyn ArtifactStore>,
        cipher: ContentCipher,
        model: Arc<dyn ContentModel>,
        images: Arc<dyn ImageLookup>,
    ) -> Self {
        Self {
            quota: QuotaEnforcer::new(accounts),
            artifacts,
            cipher,
            model,
            images,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
        }
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    /// Reserves one generation for `account`
    ///
    /// # Errors
    ///
    /// [`GenerationError::LimitReached`] for a Free account at its cap. The
    /// model is never invoked in that case.
    pub async fn admit(&self, account: &Account) -> Result<Reservation, GenerationError> {
        match self.quota.reserve(account).await {
            Ok(generation_count) => Ok(Reservation {
                account_id: account.id,
                generation_count,
            }),
            Err(err) => {
                let err = GenerationError::from(err);
                if err.is_limit_reached() {
                    tracing::info!(account_id = %account.id, "Generation refused: monthly limit reached");
                }
                Err(err)
            }
        }
    }

    /// Runs an admitted generation to completion
    ///
    /// On success the artifact is stored and `sink.finished` has been called
    /// with its slug. On failure the reservation is released and
    /// `sink.failed` has been called.
    pub async fn run(
        &self,
        reservation: Reservation,
        prompt: &str,
        sink: &mut dyn OutputSink,
    ) -> Result<GeneratedArtifact, GenerationError> {
        let started = Instant::now();
        let account_id = reservation.account_id;

        tracing::info!(
            account_id = %account_id,
            model = self.model.name(),
            mode = ?sink.mode(),
            "Generation started"
        );

        match self.produce(&reservation, prompt, sink).await {
            Ok(artifact) => {
                sink.finished(&artifact.slug).await;
                tracing::info!(
                    account_id = %account_id,
                    slug = %artifact.slug,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Generation complete"
                );
                Ok(artifact)
            }
            Err(err) => {
                tracing::error!(
                    account_id = %account_id,
                    error = %err,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Generation failed"
                );
                if let Err(release_err) = self.quota.release(account_id).await {
                    tracing::error!(
                        account_id = %account_id,
                        error = %release_err,
                        "Failed to release generation reservation"
                    );
                }
                sink.failed().await;
                Err(err)
            }
        }
    }

    /// Admits and runs in one call
    pub async fn generate(
        &self,
        account: &Account,
        prompt: &str,
        sink: &mut dyn OutputSink,
    ) -> Result<GeneratedArtifact, GenerationError> {
        let reservation = self.admit(account).await?;
        self.run(reservation, prompt, sink).await
    }

    async fn produce(
        &self,
        reservation: &Reservation,
        prompt: &str,
        sink: &mut dyn OutputSink,
    ) -> Result<GeneratedArtifact, GenerationError> {
        let instruction = build_instruction(prompt);

        let raw = tokio::time::timeout(self.model_timeout, self.invoke(&instruction, sink))
            .await
            .map_err(|_| ModelError::Timeout(self.model_timeout))??;

        if raw.trim().is_empty() {
            return Err(GenerationError::EmptyOutput);
        }

        let title = derive_title(&raw);
        let markdown = resolve_image_tags(&raw, self.images.as_ref()).await;
        let html = render_markdown(&markdown);
        let slug = generate_slug();

        self.artifacts
            .create_artifact(CreateArtifact {
                account_id: reservation.account_id,
                slug: slug.clone(),
                prompt: prompt.to_string(),
                title: title.clone(),
                content: self.cipher.encrypt(Some(&html)).unwrap_or_default(),
                raw_content: self.cipher.encrypt(Some(&markdown)),
            })
            .await?;

        Ok(GeneratedArtifact {
            slug,
            title,
            generation_count: reservation.generation_count,
        })
    }

    /// Calls the model in the sink's mode and returns the full text
    async fn invoke(
        &self,
        instruction: &str,
        sink: &mut dyn OutputSink,
    ) -> Result<String, ModelError> {
        match sink.mode() {
            InvocationMode::Buffered => self.model.generate(instruction).await,
            InvocationMode::Streaming => {
                let mut fragments = self.model.generate_stream(instruction).await?;
                let mut text = String::new();

                while let Some(fragment) = fragments.next().await {
                    let fragment = fragment?;
                    sink.fragment(&fragment).await;
                    text.push_str(&fragment);
                }

                Ok(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::StaticImageLookup;
    use crate::model::ScriptedModel;
    use crate::sink::{BufferedSink, ChannelSink, StreamRecord};
    use oracle_shared::models::account::{AccountTier, CreateAccount, UpdateAccount};
    use oracle_shared::store::MemoryStore;
    use tokio::sync::mpsc;

    struct Fixture {
        store: Arc<MemoryStore>,
        model: Arc<ScriptedModel>,
        cipher: ContentCipher,
        pipeline: GenerationPipeline,
    }

    fn fixture(model: ScriptedModel, images: StaticImageLookup) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(model);
        let cipher = ContentCipher::new([9u8; 32]);
        let pipeline = GenerationPipeline::new(
            store.clone(),
            store.clone(),
            cipher.clone(),
            model.clone(),
            Arc::new(images),
        );
        Fixture {
            store,
            model,
            cipher,
            pipeline,
        }
    }

    async fn account(store: &MemoryStore, tier: AccountTier, count: i32) -> Account {
        let account = store
            .create_account(CreateAccount {
                username: format!("user-{}", Uuid::new_v4()),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        store
            .update_account(
                account.id,
                UpdateAccount {
                    tier: Some(tier),
                    generation_count: Some(count),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap()
    }

    async fn stored_count(store: &MemoryStore, id: Uuid) -> i32 {
        store.find_account(id).await.unwrap().unwrap().generation_count
    }

    #[tokio::test]
    async fn test_buffered_generation_persists_encrypted_artifact() {
        let f = fixture(
            ScriptedModel::new(["# Ode to ", "Rome\n\n", "[[WIKISEARCH: Rome]]"]),
            StaticImageLookup::new().with_image("Rome", "https://img/rome.jpg"),
        );
        let acct = account(&f.store, AccountTier::Free, 0).await;
        let mut sink = BufferedSink::new();

        let artifact = f.pipeline.generate(&acct, "rome", &mut sink).await.unwrap();

        assert_eq!(artifact.title, "Ode to Rome");
        assert_eq!(artifact.generation_count, 1);
        assert_eq!(sink.slug(), Some(artifact.slug.as_str()));
        assert_eq!(stored_count(&f.store, acct.id).await, 1);

        let stored = f
            .store
            .find_owned_artifact(&artifact.slug, acct.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.prompt, "rome");
        assert!(!stored.content.contains("Rome"), "content must be encrypted");

        let revealed = stored.reveal(&f.cipher);
        assert!(revealed.html.contains("<h1>Ode to Rome</h1>"));
        assert!(revealed.html.contains("https://img/rome.jpg"));
        assert_eq!(
            revealed.markdown.as_deref(),
            Some("# Ode to Rome\n\n![Rome](https://img/rome.jpg)")
        );
    }

    #[tokio::test]
    async fn test_limit_reached_never_invokes_model() {
        let f = fixture(ScriptedModel::new(["# x"]), StaticImageLookup::new());
        let acct = account(&f.store, AccountTier::Free, 10).await;
        let mut sink = BufferedSink::new();

        let err = f.pipeline.generate(&acct, "p", &mut sink).await.unwrap_err();

        assert!(err.is_limit_reached());
        assert_eq!(f.model.invocations(), 0);
        assert_eq!(stored_count(&f.store, acct.id).await, 10);
        assert_eq!(f.store.artifact_count().await, 0);
        assert_eq!(sink.slug(), None);
    }

    #[tokio::test]
    async fn test_paid_tier_passes_free_cap() {
        let f = fixture(ScriptedModel::new(["# x"]), StaticImageLookup::new());
        let acct = account(&f.store, AccountTier::Plus, 10).await;

        let artifact = f
            .pipeline
            .generate(&acct, "p", &mut BufferedSink::new())
            .await
            .unwrap();
        assert_eq!(artifact.generation_count, 11);
    }

    #[tokio::test]
    async fn test_streaming_forwards_fragments_then_done() {
        let f = fixture(ScriptedModel::new(["He", "llo"]), StaticImageLookup::new());
        let acct = account(&f.store, AccountTier::Free, 0).await;
        let (tx, mut rx) = mpsc::channel(16);
        let mut sink = ChannelSink::new(tx);

        let artifact = f.pipeline.generate(&acct, "p", &mut sink).await.unwrap();
        drop(sink);

        let mut records = Vec::new();
        while let Some(record) = rx.recv().await {
            records.push(record);
        }
        assert_eq!(
            records,
            vec![
                StreamRecord::chunk("He"),
                StreamRecord::chunk("llo"),
                StreamRecord::done(artifact.slug.clone()),
            ]
        );
        assert_eq!(artifact.title, "Creative Piece");
    }

    #[tokio::test]
    async fn test_streaming_forwards_empty_fragments() {
        let f = fixture(ScriptedModel::new(["He", "", "llo"]), StaticImageLookup::new());
        let acct = account(&f.store, AccountTier::Free, 0).await;
        let (tx, mut rx) = mpsc::channel(16);
        let mut sink = ChannelSink::new(tx);

        let artifact = f.pipeline.generate(&acct, "p", &mut sink).await.unwrap();
        drop(sink);

        let mut records = Vec::new();
        while let Some(record) = rx.recv().await {
            records.push(record);
        }
        assert_eq!(
            records,
            vec![
                StreamRecord::chunk("He"),
                StreamRecord::chunk(""),
                StreamRecord::chunk("llo"),
                StreamRecord::done(artifact.slug.clone()),
            ]
        );
    }

    #[tokio::test]
    async fn test_model_failure_releases_reservation() {
        let f = fixture(
            ScriptedModel::failing_after(["# Half"], "connection reset"),
            StaticImageLookup::new(),
        );
        let acct = account(&f.store, AccountTier::Free, 4).await;
        let (tx, mut rx) = mpsc::channel(16);
        let mut sink = ChannelSink::new(tx);

        let err = f.pipeline.generate(&acct, "p", &mut sink).await.unwrap_err();
        drop(sink);

        assert!(matches!(err, GenerationError::Model(_)));
        assert_eq!(stored_count(&f.store, acct.id).await, 4);
        assert_eq!(f.store.artifact_count().await, 0);

        assert_eq!(rx.recv().await, Some(StreamRecord::chunk("# Half")));
        assert_eq!(rx.recv().await, Some(StreamRecord::failed()));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_empty_output_is_failure() {
        let f = fixture(ScriptedModel::new(["  ", "\n"]), StaticImageLookup::new());
        let acct = account(&f.store, AccountTier::Free, 0).await;
        let mut sink = BufferedSink::new();

        let err = f.pipeline.generate(&acct, "p", &mut sink).await.unwrap_err();

        assert!(matches!(err, GenerationError::EmptyOutput));
        assert!(sink.has_failed());
        assert_eq!(stored_count(&f.store, acct.id).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_timeout() {
        let f = fixture(
            ScriptedModel::new(["# slow"]).with_delay(Duration::from_secs(30)),
            StaticImageLookup::new(),
        );
        let pipeline = f.pipeline.with_model_timeout(Duration::from_secs(5));
        let acct = account(&f.store, AccountTier::Free, 0).await;

        let err = pipeline
            .generate(&acct, "p", &mut BufferedSink::new())
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Model(ModelError::Timeout(_))));
        assert_eq!(stored_count(&f.store, acct.id).await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_admission_at_nine() {
        let f = fixture(ScriptedModel::new(["# x"]), StaticImageLookup::new());
        let acct = account(&f.store, AccountTier::Free, 9).await;

        let (first, second) = tokio::join!(f.pipeline.admit(&acct), f.pipeline.admit(&acct));

        let granted = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(granted, 1);
        assert_eq!(stored_count(&f.store, acct.id).await, 10);
    }
}
