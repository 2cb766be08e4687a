//! Payments webhook processing: signature verification first, then the
//! event is applied through the subscription store. A request that fails
//! verification is dropped before any processing; bookkeeping failures
//! after a valid signature are logged but still acknowledged, so the
//! payments provider never redelivers over a purely internal problem.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::SubscriptionChange;

type HmacSha256 = Hmac<Sha256>;

/// Accepted clock skew between the signature timestamp and now.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error, PartialEq)]
pub enum SignatureError {
    #[error("signature header is malformed")]
    MalformedHeader,

    #[error("signature timestamp is outside the tolerance window")]
    StaleTimestamp,

    #[error("no signature matched the payload")]
    NoMatch,
}

/// Verify a `stripe-signature` header (`t=<ts>,v1=<hex>`) against the
/// raw payload: HMAC-SHA256 over `"{t}.{payload}"`, constant-time
/// comparison, bounded timestamp skew.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<Vec<u8>> = Vec::new();

    for element in header.split(',') {
        let mut parts = element.trim().splitn(2, '=');
        match (parts.next(), parts.next()) {
            (Some("t"), Some(value)) => {
                timestamp = Some(value.parse().map_err(|_| SignatureError::MalformedHeader)?);
            }
            (Some("v1"), Some(value)) => {
                candidates.push(hex::decode(value).map_err(|_| SignatureError::MalformedHeader)?);
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if candidates.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::StaleTimestamp);
    }

    for candidate in &candidates {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| SignatureError::MalformedHeader)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(candidate).is_ok() {
            return Ok(());
        }
    }

    Err(SignatureError::NoMatch)
}

/// Produce a valid header for a payload, as the provider would.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: Value,
}

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Persistence seam for subscription bookkeeping.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn upsert(&self, change: SubscriptionChange) -> Result<(), StoreError>;

    async fn mark_canceled(&self, stripe_subscription_id: &str) -> Result<(), StoreError>;
}

/// Store backed by the gateway database.
pub struct PgSubscriptionStore;

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn upsert(&self, change: SubscriptionChange) -> Result<(), StoreError> {
        crate::database::queries::subscriptions::upsert_subscription(&change).await?;
        Ok(())
    }

    async fn mark_canceled(&self, stripe_subscription_id: &str) -> Result<(), StoreError> {
        crate::database::queries::subscriptions::mark_canceled(stripe_subscription_id).await?;
        Ok(())
    }
}

fn metadata_field(object: &Value, key: &str) -> Option<String> {
    object["metadata"][key].as_str().map(str::to_string)
}

fn parse_period_end(object: &Value) -> Option<DateTime<Utc>> {
    object["current_period_end"]
        .as_i64()
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}

/// Apply one verified event. Events that cannot be attributed to a user
/// are logged and acknowledged rather than failed: redelivery would not
/// fix them.
pub async fn apply_event(
    event: &WebhookEvent,
    store: &dyn SubscriptionStore,
) -> Result<(), StoreError> {
    let object = &event.data.object;

    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let Some(user_id) = metadata_field(object, "user_id")
                .and_then(|id| Uuid::parse_str(&id).ok())
            else {
                tracing::warn!(event_id = %event.id, "checkout completed without user_id metadata");
                return Ok(());
            };

            store
                .upsert(SubscriptionChange {
                    user_id,
                    stripe_subscription_id: object["subscription"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                    plan: metadata_field(object, "plan").unwrap_or_else(|| "unknown".to_string()),
                    billing_cycle: metadata_field(object, "billing_cycle")
                        .unwrap_or_else(|| "monthly".to_string()),
                    status: "active".to_string(),
                    current_period_end: None,
                    cancel_at_period_end: false,
                })
                .await
        }
        "customer.subscription.updated" => {
            let Some(user_id) = metadata_field(object, "user_id")
                .and_then(|id| Uuid::parse_str(&id).ok())
            else {
                tracing::warn!(event_id = %event.id, "subscription update without user_id metadata");
                return Ok(());
            };

            store
                .upsert(SubscriptionChange {
                    user_id,
                    stripe_subscription_id: object["id"].as_str().unwrap_or_default().to_string(),
                    plan: metadata_field(object, "plan").unwrap_or_else(|| "unknown".to_string()),
                    billing_cycle: metadata_field(object, "billing_cycle")
                        .unwrap_or_else(|| "monthly".to_string()),
                    status: object["status"].as_str().unwrap_or("active").to_string(),
                    current_period_end: parse_period_end(object),
                    cancel_at_period_end: object["cancel_at_period_end"]
                        .as_bool()
                        .unwrap_or(false),
                })
                .await
        }
        "customer.subscription.deleted" => {
            let subscription_id = object["id"].as_str().unwrap_or_default();
            store.mark_canceled(subscription_id).await
        }
        other => {
            tracing::debug!(event_type = other, "ignoring webhook event type");
            Ok(())
        }
    }
}
