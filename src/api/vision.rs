use axum::{extract::State, http::StatusCode, Json};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ai::core::providers::{Usage, VisionInput};
use crate::api::errors::{ApiResult, AppError};
use crate::api::state::AppState;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct VisionApiRequest {
    pub image_url: Option<String>,
    pub image_base64: Option<String>,
    pub mime_type: Option<String>,
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct VisionApiResponse {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<VisionApiRequest>,
) -> ApiResult<Json<VisionApiResponse>> {
    let input = if let Some(url) = request.image_url.filter(|u| !u.is_empty()) {
        VisionInput::Url(url)
    } else if let Some(data) = request.image_base64.filter(|d| !d.is_empty()) {
        VisionInput::Base64 {
            data,
            mime_type: request.mime_type.unwrap_or_else(|| "image/jpeg".to_string()),
        }
    } else {
        return Err(AppError::missing_field("image_url or image_base64"));
    };

    let response = state
        .vision
        .describe(input, request.prompt)
        .await
        .map_err(|e| AppError::from_provider(&e))?;

    Ok((
        StatusCode::OK,
        Json(VisionApiResponse {
            description: response.description,
            usage: response.usage,
        }),
    ))
}
