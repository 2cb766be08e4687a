use axum::{extract::State, http::StatusCode, Json};
use schemars::JsonSchema;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::api::errors::ApiResult;
use crate::api::state::AppState;

#[derive(Debug, Serialize, JsonSchema)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub services: BTreeMap<String, String>,
}

fn presence(configured: bool) -> String {
    if configured { "configured" } else { "unconfigured" }.to_string()
}

pub async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let mut services = BTreeMap::new();
    services.insert(
        "openai".to_string(),
        presence(crate::config::OPENAI_API_KEY.is_some()),
    );
    services.insert(
        "anthropic".to_string(),
        presence(crate::config::ANTHROPIC_API_KEY.is_some()),
    );
    services.insert(
        "replicate".to_string(),
        presence(crate::config::REPLICATE_API_TOKEN.is_some()),
    );
    services.insert(
        "google".to_string(),
        presence(crate::config::GOOGLE_AI_API_KEY.is_some()),
    );
    services.insert(
        "d-id".to_string(),
        presence(crate::config::DID_API_KEY.is_some()),
    );
    services.insert("stripe".to_string(), presence(state.stripe.is_some()));
    services.insert(
        "database".to_string(),
        presence(crate::database::maybe_pool().is_some()),
    );

    Ok((
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
            services,
        }),
    ))
}
