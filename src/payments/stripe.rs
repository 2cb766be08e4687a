use reqwest::Client;
use serde::Deserialize;
use uuid::Uuid;

use crate::ai::core::client::{build_http_client, HttpClientConfig};
use crate::ai::core::providers::ProviderError;

const PROVIDER: &str = "stripe";

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceList {
    #[serde(default)]
    data: Vec<Price>,
}

#[derive(Debug, Deserialize)]
struct Price {
    id: String,
}

impl StripeClient {
    pub fn new(
        secret_key: String,
        base_url: Option<String>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let base_url = base_url.unwrap_or_else(|| "https://api.stripe.com".to_string());
        let client = build_http_client(&HttpClientConfig::with_timeout(30))?;

        Ok(Self {
            client,
            secret_key,
            base_url,
        })
    }

    /// Resolve the price for a plan/cycle pair: a configured override
    /// wins, otherwise a lookup-key search with one bounded retry pass.
    pub async fn resolve_price(
        &self,
        plan: &str,
        billing_cycle: &str,
    ) -> Result<String, ProviderError> {
        if let Some(price_id) = crate::config::stripe_price_override(plan, billing_cycle) {
            return Ok(price_id);
        }

        let lookup_key = format!("{}_{}", plan, billing_cycle);
        let mut last_error = None;

        for attempt in 1..=2u32 {
            match self.fetch_price_by_lookup_key(&lookup_key).await {
                Ok(Some(price_id)) => return Ok(price_id),
                Ok(None) => {
                    return Err(ProviderError::upstream(
                        PROVIDER,
                        format!("no price found for lookup key {}", lookup_key),
                    ))
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "price lookup failed");
                    last_error = Some(e);
                    if attempt < 2 {
                        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ProviderError::upstream(PROVIDER, "price lookup failed")))
    }

    async fn fetch_price_by_lookup_key(
        &self,
        lookup_key: &str,
    ) -> Result<Option<String>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/v1/prices", self.base_url))
            .bearer_auth(&self.secret_key)
            .query(&[("lookup_keys[]", lookup_key), ("limit", "1")])
            .send()
            .await
            .map_err(|e| ProviderError::upstream(PROVIDER, e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|e| format!("failed to read error body: {}", e));
            return Err(ProviderError::upstream(PROVIDER, error_text));
        }

        let prices: PriceList = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(PROVIDER, e.to_string()))?;

        Ok(prices.data.into_iter().next().map(|p| p.id))
    }

    pub async fn create_checkout_session(
        &self,
        plan: &str,
        billing_cycle: &str,
        email: &str,
        user_id: Option<Uuid>,
    ) -> Result<CheckoutSession, ProviderError> {
        let price_id = self.resolve_price(plan, billing_cycle).await?;

        let mut form: Vec<(String, String)> = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("customer_email".to_string(), email.to_string()),
            ("line_items[0][price]".to_string(), price_id),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            (
                "success_url".to_string(),
                crate::config::CHECKOUT_SUCCESS_URL.clone(),
            ),
            (
                "cancel_url".to_string(),
                crate::config::CHECKOUT_CANCEL_URL.clone(),
            ),
            ("metadata[plan]".to_string(), plan.to_string()),
            (
                "metadata[billing_cycle]".to_string(),
                billing_cycle.to_string(),
            ),
            (
                "subscription_data[metadata][plan]".to_string(),
                plan.to_string(),
            ),
            (
                "subscription_data[metadata][billing_cycle]".to_string(),
                billing_cycle.to_string(),
            ),
        ];
        if let Some(user_id) = user_id {
            form.push(("metadata[user_id]".to_string(), user_id.to_string()));
            form.push((
                "subscription_data[metadata][user_id]".to_string(),
                user_id.to_string(),
            ));
        }

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| ProviderError::upstream(PROVIDER, e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|e| format!("failed to read error body: {}", e));
            return Err(ProviderError::upstream(PROVIDER, error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(PROVIDER, e.to_string()))
    }
}
