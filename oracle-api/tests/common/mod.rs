#![allow(dead_code)]

//! Common test utilities for integration tests
//!
//! Builds the full router over in-memory backends:
//! - MemoryStore for accounts and artifacts
//! - In-memory sessions and rate limiting
//! - A scripted content model and a fixed image table
//!
//! Requests go through `tower::ServiceExt::oneshot`; no socket is opened.

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use oracle_api::app::{build_router, AppState, Backends};
use oracle_api::config::Config;
use oracle_api::middleware::rate_limit::MemoryRateLimiter;
use oracle_generator::images::StaticImageLookup;
use oracle_generator::model::ScriptedModel;
use oracle_shared::auth::session::MemorySessionStore;
use oracle_shared::models::account::{Account, UpdateAccount};
use oracle_shared::store::{AccountStore, MemoryStore};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

pub const PASSWORD: &str = "correct-horse-battery";

/// Test context containing all necessary resources
pub struct TestContext {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub model: Arc<ScriptedModel>,
    pub config: Config,
}

pub fn test_config() -> Config {
    let vars: HashMap<String, String> = [
        ("APP_ENV", "test"),
        (
            "SESSION_SECRET",
            "integration-test-session-secret-0123456789",
        ),
        (
            "ENCRYPTION_KEY",
            "4f1c2a9e8b7d6c5f4e3d2c1b0a9f8e7d6c5b4a39281706f5e4d3c2b1a0f9e8d7",
        ),
        ("MODEL_PROVIDER", "scripted"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    Config::from_vars(&vars).expect("test config")
}

impl TestContext {
    /// Context with the demo model and no images
    pub fn new() -> Self {
        Self::with_backends(ScriptedModel::demo(), StaticImageLookup::new())
    }

    pub fn with_model(model: ScriptedModel) -> Self {
        Self::with_backends(model, StaticImageLookup::new())
    }

    pub fn with_backends(model: ScriptedModel, images: StaticImageLookup) -> Self {
        let config = test_config();
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(model);

        let backends = Backends {
            accounts: store.clone(),
            artifacts: store.clone(),
            sessions: Arc::new(MemorySessionStore::new()),
            rate_limiter: Arc::new(MemoryRateLimiter::new()),
            model: model.clone(),
            images: Arc::new(images),
            db: None,
            redis: None,
        };

        let app = build_router(AppState::new(config.clone(), backends));

        TestContext {
            app,
            store,
            model,
            config,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, uri: &str, cookie: Option<&str>, form: &str) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(form.to_string())).unwrap())
            .await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        cookie: Option<&str>,
        body: serde_json::Value,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    /// Registers `username` and returns the `Cookie` header value
    pub async fn register(&self, username: &str) -> String {
        let response = self
            .post_form(
                "/register",
                None,
                &format!("username={}&password={}", username, PASSWORD),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        session_cookie(&response).expect("register sets a session cookie")
    }

    pub async fn account(&self, username: &str) -> Account {
        self.store
            .find_account_by_username(username)
            .await
            .unwrap()
            .expect("account exists")
    }

    pub async fn set_generation_count(&self, username: &str, count: i32) {
        let account = self.account(username).await;
        self.store
            .update_account(
                account.id,
                UpdateAccount {
                    generation_count: Some(count),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }
}

/// `name=value` part of the response's Set-Cookie header
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .next()
        .map(str::to_string)
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

/// Parses an NDJSON body into its records
pub async fn ndjson_records(response: Response<Body>) -> Vec<serde_json::Value> {
    body_text(response)
        .await
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
