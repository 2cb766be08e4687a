use axum::{extract::State, http::StatusCode, Json};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ai::core::providers::TalkRequest;
use crate::api::errors::{ApiResult, AppError};
use crate::api::state::AppState;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TalkApiRequest {
    pub image_url: Option<String>,
    pub script_text: Option<String>,
    pub voice: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct TalkApiResponse {
    pub talk_id: String,
    pub result_url: String,
}

/// Synthesize a talking-head video. The provider job is polled under the
/// configured bounded policy; budget exhaustion surfaces as a 500.
pub async fn create_talk(
    State(state): State<AppState>,
    Json(request): Json<TalkApiRequest>,
) -> ApiResult<Json<TalkApiResponse>> {
    let image_url = request
        .image_url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| AppError::missing_field("image_url"))?;
    let script_text = request
        .script_text
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::missing_field("script_text"))?;

    let result = state
        .talks
        .synthesize(TalkRequest {
            image_url,
            script_text,
            voice: request.voice,
        })
        .await
        .map_err(|e| AppError::from_provider(&e))?;

    Ok((
        StatusCode::OK,
        Json(TalkApiResponse {
            talk_id: result.talk_id,
            result_url: result.result_url,
        }),
    ))
}
