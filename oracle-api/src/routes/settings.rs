/// Account settings
///
/// # Endpoints
///
/// - `GET  /settings` - Account summary
/// - `POST /settings` - Form `current_password`, `new_password`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::session::CurrentAccount,
    routes::AccountSummary,
};
use axum::{extract::State, Extension, Form, Json};
use oracle_shared::{auth::password, models::account::UpdateAccount};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordChange {
    pub current_password: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub account: AccountSummary,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub async fn show_settings(
    Extension(CurrentAccount(account)): Extension<CurrentAccount>,
) -> Json<SettingsResponse> {
    Json(SettingsResponse {
        account: AccountSummary::from(&account),
        message: None,
    })
}

/// Changes the password
///
/// # Errors
///
/// - `400 Bad Request`: "Incorrect current password."
/// - `422 Unprocessable Entity`: new password too short
pub async fn update_password(
    State(state): State<AppState>,
    Extension(CurrentAccount(account)): Extension<CurrentAccount>,
    Form(change): Form<PasswordChange>,
) -> ApiResult<Json<SettingsResponse>> {
    if !password::verify_password(&change.current_password, &account.password_hash)? {
        return Err(ApiError::BadRequest(
            "Incorrect current password.".to_string(),
        ));
    }

    change.validate().map_err(ApiError::from_validation)?;

    let password_hash = password::hash_password(&change.new_password)?;
    let account = state
        .accounts
        .update_account(
            account.id,
            UpdateAccount {
                password_hash: Some(password_hash),
                ..Default::default()
            },
        )
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".to_string()))?;

    tracing::info!(account_id = %account.id, "Password changed");

    Ok(Json(SettingsResponse {
        account: AccountSummary::from(&account),
        message: Some("Password updated successfully.".to_string()),
    }))
}
