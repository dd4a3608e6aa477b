/// Generation endpoints
///
/// Both endpoints drive the same [`GenerationPipeline`](oracle_generator::GenerationPipeline);
/// they differ only in the sink the output goes to.
///
/// # Endpoints
///
/// - `POST /consult-oracle` - Buffered; answers with a redirect
/// - `POST /api/chat/stream` - Streaming; answers with NDJSON
///
/// # Stream format
///
/// ```text
/// {"type":"chunk","content":"He"}
/// {"type":"chunk","content":"llo"}
/// {"type":"done","slug":"a1b2c3d4e5f6"}
/// ```
///
/// The last line is either `done` or `{"type":"error","message":"Generation failed."}`.

use crate::{
    app::AppState,
    error::ApiError,
    middleware::{rate_limit::client_ip, session::CurrentAccount},
};
use axum::{
    async_trait,
    body::Body,
    extract::{ConnectInfo, FromRequest, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Extension, Form, Json,
};
use futures::StreamExt;
use oracle_generator::{BufferedSink, ChannelSink, StreamRecord};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Where a refused generation sends the caller
pub const LIMIT_REACHED_REDIRECT: &str = "/pricing?reason=limit_reached";

/// Records buffered between the pipeline task and the response body
const STREAM_BUFFER: usize = 64;

#[derive(Debug, Default, Deserialize)]
pub struct PromptForm {
    #[serde(default)]
    pub prompt: Option<String>,
}

impl PromptForm {
    /// The prompt, if present and not blank
    pub fn prompt(&self) -> Option<&str> {
        self.prompt
            .as_deref()
            .map(str::trim)
            .filter(|prompt| !prompt.is_empty())
    }
}

/// Prompt from a JSON or form-encoded body
///
/// A body that cannot be parsed yields an empty form, which handlers treat
/// as a missing prompt.
#[derive(Debug, Default)]
pub struct PromptBody(pub PromptForm);

#[async_trait]
impl<S> FromRequest<S> for PromptBody
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|content_type| content_type.starts_with("application/json"))
            .unwrap_or(false);

        let form = if is_json {
            Json::<PromptForm>::from_request(req, state)
                .await
                .map(|Json(form)| form)
                .unwrap_or_default()
        } else {
            Form::<PromptForm>::from_request(req, state)
                .await
                .map(|Form(form)| form)
                .unwrap_or_default()
        };

        Ok(PromptBody(form))
    }
}

/// Buffered generation
///
/// # Endpoint
///
/// ```text
/// POST /consult-oracle
/// Content-Type: application/x-www-form-urlencoded
///
/// prompt=a+sonnet+about+the+sea
/// ```
///
/// # Redirects
///
/// - `/post/<slug>` on success
/// - `/pricing?reason=limit_reached` when the monthly limit is used up
/// - `/` when the prompt is missing or generation fails
pub async fn consult_oracle(
    State(state): State<AppState>,
    Extension(CurrentAccount(account)): Extension<CurrentAccount>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    PromptBody(form): PromptBody,
) -> Redirect {
    let Some(prompt) = form.prompt() else {
        return Redirect::to("/");
    };

    let reservation = match state.pipeline.admit(&account).await {
        Ok(reservation) => reservation,
        Err(e) if e.is_limit_reached() => return Redirect::to(LIMIT_REACHED_REDIRECT),
        Err(e) => {
            tracing::error!(
                account_id = %account.id,
                method = "POST",
                url = "/consult-oracle",
                ip = %client_ip(&headers, connect.map(|ConnectInfo(addr)| addr)),
                error = %e,
                "Generation admission failed"
            );
            return Redirect::to("/");
        }
    };

    let mut sink = BufferedSink::new();
    match state.pipeline.run(reservation, prompt, &mut sink).await {
        Ok(artifact) => Redirect::to(&format!("/post/{}", artifact.slug)),
        Err(e) => {
            tracing::error!(
                account_id = %account.id,
                method = "POST",
                url = "/consult-oracle",
                ip = %client_ip(&headers, connect.map(|ConnectInfo(addr)| addr)),
                error = %e,
                "Generation failed"
            );
            Redirect::to("/")
        }
    }
}

/// Streaming generation
///
/// # Endpoint
///
/// ```text
/// POST /api/chat/stream
/// Content-Type: application/json
///
/// { "prompt": "a sonnet about the sea" }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: `{"error": "No prompt provided"}`
/// - `403 Forbidden`: `{"error": "Limit reached", "redirect": "/pricing?reason=limit_reached"}`
///
/// Failures after the stream has started arrive as the final `error` record.
/// The generation keeps running if the client goes away.
pub async fn chat_stream(
    State(state): State<AppState>,
    Extension(CurrentAccount(account)): Extension<CurrentAccount>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    PromptBody(form): PromptBody,
) -> Response {
    let Some(prompt) = form.prompt().map(str::to_string) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "No prompt provided" })),
        )
            .into_response();
    };

    let reservation = match state.pipeline.admit(&account).await {
        Ok(reservation) => reservation,
        Err(e) if e.is_limit_reached() => {
            return (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "Limit reached",
                    "redirect": LIMIT_REACHED_REDIRECT,
                })),
            )
                .into_response();
        }
        Err(e) => return ApiError::from(e).into_response(),
    };

    let ip = client_ip(&headers, connect.map(|ConnectInfo(addr)| addr));
    let (tx, rx) = mpsc::channel::<StreamRecord>(STREAM_BUFFER);
    let pipeline = state.pipeline.clone();
    let account_id = account.id;

    tokio::spawn(async move {
        let mut sink = ChannelSink::new(tx);
        if let Err(e) = pipeline.run(reservation, &prompt, &mut sink).await {
            tracing::error!(
                account_id = %account_id,
                method = "POST",
                url = "/api/chat/stream",
                ip = %ip,
                error = %e,
                "Streaming generation failed"
            );
        }
    });

    let body = Body::from_stream(
        ReceiverStream::new(rx).map(|record| Ok::<_, Infallible>(record.to_ndjson_line())),
    );

    (
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response()
}
