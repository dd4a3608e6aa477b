/// Authentication endpoints
///
/// Cookie sessions: a successful register or login stores a server-side
/// session and sets the signed `oracle.sid` cookie.
///
/// # Endpoints
///
/// - `GET  /register`, `GET /login` - Form descriptions
/// - `POST /register` - Create a Free account and sign in
/// - `POST /login` - Sign in
/// - `GET  /logout` - Sign out

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::session::{clear_session_cookie, read_session_cookie, session_cookie},
};
use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use oracle_shared::{
    auth::password,
    models::account::CreateAccount,
    store::StoreError,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Register form
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3 to 50 characters"))]
    pub username: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

/// Login form
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Form page description
#[derive(Debug, Serialize)]
pub struct FormPage {
    pub page: &'static str,
    pub action: &'static str,
    pub fields: &'static [&'static str],
}

pub async fn register_page() -> Json<FormPage> {
    Json(FormPage {
        page: "register",
        action: "/register",
        fields: &["username", "password"],
    })
}

pub async fn login_page() -> Json<FormPage> {
    Json(FormPage {
        page: "login",
        action: "/login",
        fields: &["username", "password"],
    })
}

/// Register a new account
///
/// # Endpoint
///
/// ```text
/// POST /register
/// Content-Type: application/x-www-form-urlencoded
///
/// username=merlin&password=correct-horse
/// ```
///
/// Redirects to `/` with the session cookie set.
///
/// # Errors
///
/// - `409 Conflict`: "Username already taken."
/// - `422 Unprocessable Entity`: Validation failed
pub async fn register(
    State(state): State<AppState>,
    Form(req): Form<RegisterRequest>,
) -> ApiResult<Response> {
    let req = RegisterRequest {
        username: req.username.trim().to_string(),
        password: req.password,
    };
    req.validate().map_err(ApiError::from_validation)?;

    if state
        .accounts
        .find_account_by_username(&req.username)
        .await?
        .is_some()
    {
        return Err(username_taken());
    }

    let password_hash = password::hash_password(&req.password)?;

    let account = state
        .accounts
        .create_account(CreateAccount {
            username: req.username,
            password_hash,
        })
        .await
        .map_err(|e| match e {
            // Lost a race with a concurrent registration
            StoreError::Conflict(_) => username_taken(),
            other => other.into(),
        })?;

    tracing::info!(account_id = %account.id, username = %account.username, "Account registered");

    start_session(&state, account.id).await
}

/// Sign in
///
/// # Errors
///
/// - `401 Unauthorized`: "Invalid credentials."
pub async fn login(
    State(state): State<AppState>,
    Form(req): Form<LoginRequest>,
) -> ApiResult<Response> {
    let account = state
        .accounts
        .find_account_by_username(req.username.trim())
        .await?
        .ok_or_else(invalid_credentials)?;

    if !password::verify_password(&req.password, &account.password_hash)? {
        tracing::info!(username = %account.username, "Login rejected: wrong password");
        return Err(invalid_credentials());
    }

    tracing::info!(account_id = %account.id, "Login succeeded");

    start_session(&state, account.id).await
}

/// Sign out
///
/// Destroys the session (if any), clears the cookie and redirects to
/// `/login`.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(session_id) = read_session_cookie(&headers).and_then(|c| state.signer.verify(c)) {
        if let Err(e) = state.sessions.destroy(&session_id).await {
            tracing::warn!(error = %e, "Failed to destroy session on logout");
        }
    }

    (
        [(header::SET_COOKIE, clear_session_cookie(state.production()))],
        Redirect::to("/login"),
    )
        .into_response()
}

async fn start_session(state: &AppState, account_id: Uuid) -> ApiResult<Response> {
    let session_id = state.sessions.create(account_id).await?;
    let cookie = session_cookie(&state.signer.sign(&session_id), state.production());

    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response())
}

fn username_taken() -> ApiError {
    ApiError::Conflict("Username already taken.".to_string())
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid credentials.".to_string())
}
