use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::api::errors::{ApiResult, AppError};
use crate::api::state::AppState;
use crate::payments::webhook::{apply_event, verify_signature, WebhookEvent};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CheckoutApiRequest {
    pub plan: Option<String>,
    pub billing_cycle: Option<String>,
    pub email: Option<String>,
    pub user_id: Option<uuid::Uuid>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CheckoutApiResponse {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct WebhookAck {
    pub received: bool,
}

pub async fn create_checkout_session(
    State(state): State<AppState>,
    Json(request): Json<CheckoutApiRequest>,
) -> ApiResult<Json<CheckoutApiResponse>> {
    let plan = required(request.plan, "plan")?;
    let billing_cycle = required(request.billing_cycle, "billing_cycle")?;
    let email = required(request.email, "email")?;

    let stripe = state
        .stripe
        .as_ref()
        .ok_or_else(AppError::payments_not_configured)?;

    let session = stripe
        .create_checkout_session(&plan, &billing_cycle, &email, request.user_id)
        .await
        .map_err(|e| AppError::from_provider(&e))?;

    Ok((
        StatusCode::OK,
        Json(CheckoutApiResponse {
            session_id: session.id,
            checkout_url: session.url,
        }),
    ))
}

/// The webhook must see the raw body: signature verification runs over
/// the exact bytes the provider signed, before any parsing.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let secret = state
        .webhook_secret
        .as_ref()
        .ok_or_else(|| AppError::internal_error("webhook secret not configured"))?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(AppError::invalid_signature)?;

    verify_signature(&body, signature, secret, Utc::now().timestamp())
        .map_err(|_| AppError::invalid_signature())?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::invalid_input(format!("invalid event payload: {}", e)))?;

    // Internal bookkeeping failures are logged, not surfaced: failing
    // the acknowledgment would only trigger redelivery storms
    if let Err(e) = apply_event(&event, state.subscriptions.as_ref()).await {
        tracing::warn!(event_id = %event.id, event_type = %event.event_type, error = %e,
            "webhook bookkeeping failed");
    }

    Ok((StatusCode::OK, Json(WebhookAck { received: true })))
}

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::missing_field(field))
}
