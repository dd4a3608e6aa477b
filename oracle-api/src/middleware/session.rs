/// Session gate
///
/// Resolves the `oracle.sid` cookie to an [`Account`] and attaches it to the
/// request as [`CurrentAccount`]:
///
/// ```text
/// cookie ──verify HMAC──> session id ──store──> account id ──store──> Account
///                                                                      │
///                                              lazy monthly reset <────┘
/// ```
///
/// Requests that cannot be resolved are turned away before reaching the
/// handler: page routes are redirected to `/login`, `/api/*` routes get a
/// 401 JSON body. A session whose account has disappeared is destroyed.
///
/// # Example
///
/// ```no_run
/// use axum::{Extension, Router, routing::get};
/// use oracle_api::{app::AppState, middleware::session::{require_account, CurrentAccount}};
///
/// async fn me(Extension(CurrentAccount(account)): Extension<CurrentAccount>) -> String {
///     account.username
/// }
///
/// # fn example(state: AppState) -> Router<AppState> {
/// Router::new()
///     .route("/me", get(me))
///     .route_layer(axum::middleware::from_fn_with_state(state, require_account))
/// # }
/// ```

use crate::app::AppState;
use crate::error::ApiError;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use oracle_shared::auth::session::{SESSION_COOKIE_NAME, SESSION_TTL};
use oracle_shared::models::account::Account;

/// The authenticated account, as inserted by [`require_account`]
#[derive(Debug, Clone)]
pub struct CurrentAccount(pub Account);

/// Requires a valid session
pub async fn require_account(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let wants_json = request.uri().path().starts_with("/api/");

    let Some(session_id) = read_session_cookie(request.headers())
        .and_then(|cookie| state.signer.verify(cookie))
    else {
        return unauthenticated(wants_json);
    };

    let account_id = match state.sessions.resolve(&session_id).await {
        Ok(Some(id)) => id,
        Ok(None) => return unauthenticated(wants_json),
        Err(e) => return ApiError::from(e).into_response(),
    };

    let account = match state.accounts.find_account(account_id).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            tracing::warn!(account_id = %account_id, "Session refers to a missing account");
            if let Err(e) = state.sessions.destroy(&session_id).await {
                tracing::warn!(error = %e, "Failed to destroy orphaned session");
            }
            return unauthenticated(wants_json);
        }
        Err(e) => return ApiError::from(e).into_response(),
    };

    let account = match state.quota.refresh(account, Utc::now()).await {
        Ok(account) => account,
        Err(e) => return ApiError::from(e).into_response(),
    };

    request.extensions_mut().insert(CurrentAccount(account));

    next.run(request).await
}

fn unauthenticated(wants_json: bool) -> Response {
    if wants_json {
        ApiError::Unauthorized("Authentication required".to_string()).into_response()
    } else {
        Redirect::to("/login").into_response()
    }
}

/// Finds the session cookie's raw value in the `Cookie` headers
pub fn read_session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE_NAME)
        .map(|(_, value)| value)
}

/// `Set-Cookie` value carrying a signed session id
pub fn session_cookie(signed_value: &str, production: bool) -> HeaderValue {
    cookie_header(signed_value, SESSION_TTL.as_secs(), production)
}

/// `Set-Cookie` value that removes the session cookie
pub fn clear_session_cookie(production: bool) -> HeaderValue {
    cookie_header("", 0, production)
}

fn cookie_header(value: &str, max_age: u64, production: bool) -> HeaderValue {
    let attributes = if production {
        "Secure; SameSite=None"
    } else {
        "SameSite=Lax"
    };
    let cookie = format!(
        "{}={}; HttpOnly; Path=/; Max-Age={}; {}",
        SESSION_COOKIE_NAME, value, max_age, attributes
    );

    // Signed values are hex and '.', always a valid header value
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}
