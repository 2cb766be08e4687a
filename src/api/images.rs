use axum::{
    extract::State,
    http::StatusCode,
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ai::core::providers::{ImageLocator, ImageRequest};
use crate::api::errors::AppError;
use crate::api::state::AppState;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ImageApiRequest {
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub size: Option<String>,
    pub reference_image_url: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ImageApiResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    pub model: String,
}

pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<ImageApiRequest>,
) -> Result<Response, AppError> {
    let prompt = request
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::missing_field("prompt"))?
        .to_string();

    let generated = state
        .caps
        .image
        .generate(ImageRequest {
            prompt,
            reference_image: request.reference_image_url.map(ImageLocator::url),
            model: request.model,
            size: request.size,
        })
        .await
        .map_err(|e| AppError::from_provider(&e))?;

    let (image_url, image_data) = match &generated.image {
        ImageLocator::Url { url } => (Some(url.clone()), None),
        ImageLocator::Inline { data, .. } => (None, Some(data.clone())),
    };

    let headers = AppendHeaders([
        (
            "x-quelle-provider",
            state.caps.image.provider_name().to_string(),
        ),
        ("x-quelle-model", generated.model.clone()),
    ]);

    Ok((
        StatusCode::OK,
        headers,
        Json(ImageApiResponse {
            image_url,
            image_data,
            model: generated.model,
        }),
    )
        .into_response())
}
