/// Mock billing
///
/// No payment is taken. "Paying" for a plan switches the account's tier and
/// starts a fresh generation allowance.
///
/// # Endpoints
///
/// - `GET  /pricing?reason=` - Tier catalogue
/// - `GET  /checkout/:plan` - Checkout page for `free|premium|plus`
/// - `POST /process-payment` - Form `plan`; redirects to `/?upgraded=true`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::session::CurrentAccount,
};
use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    Extension, Form, Json,
};
use oracle_shared::models::account::{AccountTier, UpdateAccount};
use oracle_shared::quota::QuotaLimits;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct PricingQuery {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TierOffer {
    pub tier: String,
    pub plan: &'static str,

    /// None for unlimited
    pub monthly_generations: Option<u32>,
}

impl From<AccountTier> for TierOffer {
    fn from(tier: AccountTier) -> Self {
        Self {
            tier: tier.to_string(),
            plan: plan_name(tier),
            monthly_generations: QuotaLimits::for_tier(tier).monthly_generations,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PricingResponse {
    pub tiers: Vec<TierOffer>,
    pub current_tier: String,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub plan: &'static str,
    pub offer: TierOffer,
}

#[derive(Debug, Deserialize)]
pub struct PaymentForm {
    pub plan: String,
}

pub async fn pricing(
    Extension(CurrentAccount(account)): Extension<CurrentAccount>,
    Query(query): Query<PricingQuery>,
) -> Json<PricingResponse> {
    Json(PricingResponse {
        tiers: AccountTier::all().into_iter().map(TierOffer::from).collect(),
        current_tier: account.get_tier().to_string(),
        reason: query.reason,
    })
}

/// # Errors
///
/// - `400 Bad Request`: unknown plan
pub async fn checkout(Path(plan): Path<String>) -> ApiResult<Json<CheckoutResponse>> {
    let tier = AccountTier::from_plan(&plan).ok_or_else(|| invalid_plan(&plan))?;

    Ok(Json(CheckoutResponse {
        plan: plan_name(tier),
        offer: TierOffer::from(tier),
    }))
}

/// Completes the mock payment
///
/// # Errors
///
/// - `400 Bad Request`: unknown plan
pub async fn process_payment(
    State(state): State<AppState>,
    Extension(CurrentAccount(account)): Extension<CurrentAccount>,
    Form(form): Form<PaymentForm>,
) -> ApiResult<Redirect> {
    let tier = AccountTier::from_plan(&form.plan).ok_or_else(|| invalid_plan(&form.plan))?;

    state
        .accounts
        .update_account(
            account.id,
            UpdateAccount {
                tier: Some(tier),
                generation_count: Some(0),
                ..Default::default()
            },
        )
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".to_string()))?;

    tracing::info!(
        account_id = %account.id,
        from = %account.get_tier(),
        to = %tier,
        "Plan changed"
    );

    Ok(Redirect::to("/?upgraded=true"))
}

fn plan_name(tier: AccountTier) -> &'static str {
    match tier {
        AccountTier::Free => "free",
        AccountTier::Premium => "premium",
        AccountTier::Plus => "plus",
    }
}

fn invalid_plan(plan: &str) -> ApiError {
    ApiError::BadRequest(format!("Invalid plan: {}", plan))
}
