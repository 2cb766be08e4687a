use sqlx::Error;
use uuid::Uuid;

use super::get_database_pool;
use crate::database::models::{SubscriptionChange, UserSubscription};

/// One row per user; webhook redelivery makes this an upsert.
pub async fn upsert_subscription(change: &SubscriptionChange) -> Result<UserSubscription, Error> {
    let pool = get_database_pool()?;
    sqlx::query_as::<_, UserSubscription>(
        r#"
        INSERT INTO user_subscriptions
            (user_id, stripe_subscription_id, plan, billing_cycle, status,
             current_period_end, cancel_at_period_end, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, CURRENT_TIMESTAMP)
        ON CONFLICT (user_id) DO UPDATE SET
            stripe_subscription_id = EXCLUDED.stripe_subscription_id,
            plan = EXCLUDED.plan,
            billing_cycle = EXCLUDED.billing_cycle,
            status = EXCLUDED.status,
            current_period_end = EXCLUDED.current_period_end,
            cancel_at_period_end = EXCLUDED.cancel_at_period_end,
            updated_at = CURRENT_TIMESTAMP
        RETURNING user_id, stripe_subscription_id, plan, billing_cycle, status,
                  current_period_end, cancel_at_period_end, updated_at
        "#,
    )
    .bind(change.user_id)
    .bind(&change.stripe_subscription_id)
    .bind(&change.plan)
    .bind(&change.billing_cycle)
    .bind(&change.status)
    .bind(change.current_period_end)
    .bind(change.cancel_at_period_end)
    .fetch_one(pool.as_ref())
    .await
}

pub async fn mark_canceled(stripe_subscription_id: &str) -> Result<u64, Error> {
    let pool = get_database_pool()?;
    let result = sqlx::query(
        r#"
        UPDATE user_subscriptions
        SET status = 'canceled', updated_at = CURRENT_TIMESTAMP
        WHERE stripe_subscription_id = $1
        "#,
    )
    .bind(stripe_subscription_id)
    .execute(pool.as_ref())
    .await?;

    Ok(result.rows_affected())
}

pub async fn get_subscription(user_id: Uuid) -> Result<Option<UserSubscription>, Error> {
    let pool = get_database_pool()?;
    sqlx::query_as::<_, UserSubscription>(
        r#"
        SELECT user_id, stripe_subscription_id, plan, billing_cycle, status,
               current_period_end, cancel_at_period_end, updated_at
        FROM user_subscriptions
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool.as_ref())
    .await
}
