//! # Oracle API Server
//!
//! Serves accounts, generation (buffered and NDJSON streaming), artifact
//! history, mock billing and settings.
//!
//! ## Backends
//!
//! - PostgreSQL when `DATABASE_URL` is set, in-memory stores otherwise
//! - Redis sessions and rate limiting when `REDIS_URL` is set, in-memory otherwise
//! - Gemini or the scripted model, per `MODEL_PROVIDER`
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p oracle-api
//! ```

use anyhow::Context;
use oracle_api::app::{build_router, AppState, Backends};
use oracle_api::config::{Config, LogFormat, ModelProvider};
use oracle_api::middleware::rate_limit::{MemoryRateLimiter, RateLimiter, RedisRateLimiter};
use oracle_generator::images::{ImageLookup, WikipediaImageLookup};
use oracle_generator::model::{ContentModel, GeminiModel, ScriptedModel};
use oracle_shared::auth::session::{MemorySessionStore, RedisSessionStore, SessionStore};
use oracle_shared::db::{migrations, pool};
use oracle_shared::redis::{sanitize_url, RedisClient, RedisConfig};
use oracle_shared::store::{AccountStore, ArtifactStore, MemoryStore, PgStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        env = ?config.api.env,
        "Oracle API server starting"
    );

    let backends = build_backends(&config).await?;
    let db = backends.db.clone();

    let bind_address = config.bind_address();
    let app = build_router(AppState::new(config, backends));

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!(address = %bind_address, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(db) = db {
        pool::close_pool(db).await;
    }
    tracing::info!("Server stopped");

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "oracle_api=debug,oracle_generator=debug,oracle_shared=info,tower_http=info".into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn build_backends(config: &Config) -> anyhow::Result<Backends> {
    let accounts: Arc<dyn AccountStore>;
    let artifacts: Arc<dyn ArtifactStore>;
    let mut db = None;

    match &config.database {
        Some(database) => {
            let pool = pool::create_pool(database.clone())
                .await
                .context("Failed to connect to PostgreSQL")?;
            migrations::run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;
            let store = Arc::new(PgStore::new(pool.clone()));
            accounts = store.clone();
            artifacts = store;
            db = Some(pool);
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
            let store = Arc::new(MemoryStore::new());
            accounts = store.clone();
            artifacts = store;
        }
    }

    let sessions: Arc<dyn SessionStore>;
    let rate_limiter: Arc<dyn RateLimiter>;
    let mut redis = None;

    match &config.redis_url {
        Some(url) => {
            let client = RedisClient::new(RedisConfig::new(url.clone()))
                .await
                .with_context(|| format!("Failed to connect to Redis at {}", sanitize_url(url)))?;
            sessions = Arc::new(RedisSessionStore::new(client.clone()));
            rate_limiter = Arc::new(RedisRateLimiter::new(client.clone()));
            redis = Some(client);
        }
        None => {
            tracing::warn!("REDIS_URL not set, using in-memory sessions and rate limiting");
            sessions = Arc::new(MemorySessionStore::new());
            rate_limiter = Arc::new(MemoryRateLimiter::new());
        }
    }

    let model: Arc<dyn ContentModel> = match &config.model.provider {
        ModelProvider::Gemini(gemini) => Arc::new(
            GeminiModel::new(gemini.clone()).context("Failed to build Gemini client")?,
        ),
        ModelProvider::Scripted => {
            tracing::warn!("Using the scripted model backend");
            Arc::new(ScriptedModel::demo())
        }
    };
    tracing::info!(model = model.name(), timeout_secs = config.model.timeout.as_secs(), "Model ready");

    let images: Arc<dyn ImageLookup> =
        Arc::new(WikipediaImageLookup::new().context("Failed to build image lookup client")?);

    Ok(Backends {
        accounts,
        artifacts,
        sessions,
        rate_limiter,
        model,
        images,
        db,
        redis,
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
