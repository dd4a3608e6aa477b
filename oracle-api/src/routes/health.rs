/// Health check endpoint
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "ok",
///   "version": "0.1.0",
///   "uptime_seconds": 3600,
///   "database": "connected",
///   "redis": "connected"
/// }
/// ```
///
/// Either backend reports `memory` when its in-process fallback is in use.
/// A configured backend that fails its probe turns the status into
/// `degraded`.

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use oracle_shared::db::pool;
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub database: String,
    pub redis: String,
}

pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let database = match &state.db {
        Some(db) => match pool::health_check(db).await {
            Ok(()) => "connected",
            Err(e) => {
                tracing::warn!(error = %e, "Database health probe failed");
                "disconnected"
            }
        },
        None => "memory",
    };

    let redis = match &state.redis {
        Some(client) => {
            let stats = client.stats().await;
            if stats.healthy {
                "connected"
            } else {
                tracing::warn!(url = %stats.url, "Redis health probe failed");
                "disconnected"
            }
        }
        None => "memory",
    };

    Ok(Json(HealthResponse {
        status: if database == "disconnected" || redis == "disconnected" {
            "degraded".to_string()
        } else {
            "ok".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        database: database.to_string(),
        redis: redis.to_string(),
    }))
}
