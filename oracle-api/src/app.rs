/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use oracle_api::{app::{build_router, AppState}, config::Config};
/// use oracle_generator::images::StaticImageLookup;
/// use oracle_generator::model::ScriptedModel;
/// use std::sync::Arc;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::in_memory(
///     config,
///     Arc::new(ScriptedModel::demo()),
///     Arc::new(StaticImageLookup::new()),
/// );
/// let app = build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::config::Config;
use crate::middleware::{
    errors::handle_server_errors,
    rate_limit::{
        generation_rate_limit, global_rate_limit, login_rate_limit, MemoryRateLimiter,
        RateLimiter,
    },
    security::SecurityHeadersLayer,
    session::require_account,
};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use oracle_generator::images::ImageLookup;
use oracle_generator::model::ContentModel;
use oracle_generator::GenerationPipeline;
use oracle_shared::auth::session::{MemorySessionStore, SessionSigner, SessionStore};
use oracle_shared::crypto::ContentCipher;
use oracle_shared::quota::QuotaEnforcer;
use oracle_shared::redis::RedisClient;
use oracle_shared::store::{AccountStore, ArtifactStore, MemoryStore};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Storage and service backends chosen at start-up
pub struct Backends {
    pub accounts: Arc<dyn AccountStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub model: Arc<dyn ContentModel>,
    pub images: Arc<dyn ImageLookup>,

    /// Present when the stores are PostgreSQL; probed by `/health`
    pub db: Option<PgPool>,

    /// Present when sessions and rate limits live in Redis; probed by `/health`
    pub redis: Option<RedisClient>,
}

impl Backends {
    /// In-memory stores, sessions and rate limiting
    pub fn in_memory(model: Arc<dyn ContentModel>, images: Arc<dyn ImageLookup>) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            accounts: store.clone(),
            artifacts: store,
            sessions: Arc::new(MemorySessionStore::new()),
            rate_limiter: Arc::new(MemoryRateLimiter::new()),
            model,
            images,
            db: None,
            redis: None,
        }
    }
}

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Everything inside is behind an `Arc` or is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub accounts: Arc<dyn AccountStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub signer: Arc<SessionSigner>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub quota: QuotaEnforcer,
    pub pipeline: Arc<GenerationPipeline>,
    pub db: Option<PgPool>,
    pub redis: Option<RedisClient>,
    pub started_at: Instant,
}

impl AppState {
    /// Creates new application state
    pub fn new(config: Config, backends: Backends) -> Self {
        let pipeline = GenerationPipeline::new(
            backends.accounts.clone(),
            backends.artifacts.clone(),
            config.cipher.clone(),
            backends.model,
            backends.images,
        )
        .with_model_timeout(config.model.timeout);

        Self {
            signer: Arc::new(SessionSigner::new(&config.session.secret)),
            quota: QuotaEnforcer::new(backends.accounts.clone()),
            accounts: backends.accounts,
            artifacts: backends.artifacts,
            sessions: backends.sessions,
            rate_limiter: backends.rate_limiter,
            pipeline: Arc::new(pipeline),
            db: backends.db,
            redis: backends.redis,
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }

    /// State backed entirely by in-memory stores
    pub fn in_memory(
        config: Config,
        model: Arc<dyn ContentModel>,
        images: Arc<dyn ImageLookup>,
    ) -> Self {
        Self::new(config, Backends::in_memory(model, images))
    }

    pub fn cipher(&self) -> &ContentCipher {
        &self.config.cipher
    }

    pub fn production(&self) -> bool {
        self.config.api.production()
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET  /health                     # public
/// ├── GET  /login, POST /login         # public, login rate limit on POST
/// ├── GET  /register, POST /register   # public
/// ├── GET  /logout
/// └── (session required)
///     ├── GET  /                       # dashboard + history
///     ├── GET  /post/:slug
///     ├── GET  /post/:slug/download
///     ├── POST /post/:slug/delete
///     ├── POST /consult-oracle         # generation rate limit
///     ├── POST /api/chat/stream        # generation rate limit, NDJSON
///     ├── GET  /pricing
///     ├── GET  /checkout/:plan
///     ├── POST /process-payment
///     └── GET|POST /settings
/// ```
///
/// # Middleware Stack
///
/// Outermost first:
/// 1. Security headers
/// 2. CORS
/// 3. Logging (tower-http TraceLayer)
/// 4. Global rate limit
/// 5. 5xx logging and HTML error pages
/// 6. Panic to 500 (tower-http CatchPanicLayer)
/// 7. Per-route: session gate, login/generation rate limits
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let login = post(routes::auth::login).route_layer(axum::middleware::from_fn_with_state(
        state.clone(),
        login_rate_limit,
    ));

    let public_routes = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/register",
            get(routes::auth::register_page).post(routes::auth::register),
        )
        .route("/login", get(routes::auth::login_page).merge(login))
        .route("/logout", get(routes::auth::logout));

    let generation_routes = Router::new()
        .route("/consult-oracle", post(routes::generate::consult_oracle))
        .route("/api/chat/stream", post(routes::generate::chat_stream))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            generation_rate_limit,
        ));

    let account_routes = Router::new()
        .route("/", get(routes::posts::dashboard))
        .route("/post/:slug", get(routes::posts::view_post))
        .route("/post/:slug/download", get(routes::posts::download_post))
        .route("/post/:slug/delete", post(routes::posts::delete_post))
        .route("/pricing", get(routes::billing::pricing))
        .route("/checkout/:plan", get(routes::billing::checkout))
        .route("/process-payment", post(routes::billing::process_payment))
        .route(
            "/settings",
            get(routes::settings::show_settings).post(routes::settings::update_password),
        )
        .merge(generation_routes)
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_account,
        ));

    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(public_routes)
        .merge(account_routes)
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn(handle_server_errors))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            global_rate_limit,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.production()))
        .with_state(state)
}
