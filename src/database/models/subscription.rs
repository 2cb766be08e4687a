use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UserSubscription {
    pub user_id: Uuid,
    pub stripe_subscription_id: String,
    pub plan: String,
    pub billing_cycle: String,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, sqlx::postgres::PgRow> for UserSubscription {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserSubscription {
            user_id: row.try_get("user_id")?,
            stripe_subscription_id: row.try_get("stripe_subscription_id")?,
            plan: row.try_get("plan")?,
            billing_cycle: row.try_get("billing_cycle")?,
            status: row.try_get("status")?,
            current_period_end: row.try_get("current_period_end")?,
            cancel_at_period_end: row.try_get("cancel_at_period_end")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// One state change distilled from a payments webhook event.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionChange {
    pub user_id: Uuid,
    pub stripe_subscription_id: String,
    pub plan: String,
    pub billing_cycle: String,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
}
