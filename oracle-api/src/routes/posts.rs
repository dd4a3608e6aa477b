/// Dashboard and artifact endpoints
///
/// Every artifact lookup goes through the store's owner-scoped queries, so
/// another account's slug is indistinguishable from an unknown one.
///
/// # Endpoints
///
/// - `GET  /` - Dashboard: account summary and history
/// - `GET  /post/:slug` - One artifact, decrypted
/// - `GET  /post/:slug/download` - Markdown download
/// - `POST /post/:slug/delete` - Delete

use crate::{app::AppState, error::ApiResult, middleware::session::CurrentAccount};
use crate::routes::AccountSummary;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use oracle_shared::models::artifact::ArtifactSummary;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub upgraded: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub account: AccountSummary,
    pub history: Vec<ArtifactSummary>,

    /// True right after a completed checkout
    pub upgraded: bool,
}

#[derive(Debug, Serialize)]
pub struct PostView {
    pub title: String,
    pub slug: String,
    pub prompt: String,

    /// Sanitized HTML
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub post: PostView,
    pub history: Vec<ArtifactSummary>,
}

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(CurrentAccount(account)): Extension<CurrentAccount>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<Json<DashboardResponse>> {
    let history = state.artifacts.list_owned_artifacts(account.id).await?;

    Ok(Json(DashboardResponse {
        account: AccountSummary::from(&account),
        history,
        upgraded: query.upgraded.as_deref() == Some("true"),
    }))
}

/// Shows one artifact; unknown slugs redirect to `/`
pub async fn view_post(
    State(state): State<AppState>,
    Extension(CurrentAccount(account)): Extension<CurrentAccount>,
    Path(slug): Path<String>,
) -> ApiResult<Response> {
    let Some(artifact) = state.artifacts.find_owned_artifact(&slug, account.id).await? else {
        return Ok(Redirect::to("/").into_response());
    };

    let history = state.artifacts.list_owned_artifacts(account.id).await?;
    let revealed = artifact.reveal(state.cipher());

    Ok(Json(PostResponse {
        post: PostView {
            title: artifact.title,
            slug: artifact.slug,
            prompt: artifact.prompt,
            content: revealed.html,
            created_at: artifact.created_at,
        },
        history,
    })
    .into_response())
}

/// Markdown download
///
/// The body is the stored Markdown, or the HTML for artifacts that have no
/// Markdown copy.
///
/// # Errors
///
/// - `404 Not Found`: "Post not found"
pub async fn download_post(
    State(state): State<AppState>,
    Extension(CurrentAccount(account)): Extension<CurrentAccount>,
    Path(slug): Path<String>,
) -> ApiResult<Response> {
    let Some(artifact) = state.artifacts.find_owned_artifact(&slug, account.id).await? else {
        return Ok((StatusCode::NOT_FOUND, "Post not found").into_response());
    };

    let revealed = artifact.reveal(state.cipher());
    let body = revealed.markdown.unwrap_or(revealed.html);

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}.md\"",
        artifact.slug
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_TYPE, HeaderValue::from_static("text/markdown")),
        ],
        body,
    )
        .into_response())
}

pub async fn delete_post(
    State(state): State<AppState>,
    Extension(CurrentAccount(account)): Extension<CurrentAccount>,
    Path(slug): Path<String>,
) -> ApiResult<Redirect> {
    if state.artifacts.delete_owned_artifact(&slug, account.id).await? {
        tracing::info!(account_id = %account.id, slug = %slug, "Artifact deleted");
    }

    Ok(Redirect::to("/"))
}
