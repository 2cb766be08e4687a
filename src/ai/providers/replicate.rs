use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::ai::core::client::{build_http_client, HttpClientConfig};
use crate::ai::core::poll::{poll_until, PollOutcome, PollPolicy};
use crate::ai::core::providers::{
    GeneratedImage, ImageGenerator, ImageLocator, ImageRequest, ProviderError,
};

const PROVIDER: &str = "replicate";

#[derive(Debug, Clone)]
pub struct ReplicateProvider {
    client: Client,
    api_token: String,
    base_url: String,
    default_model: String,
    poll_policy: PollPolicy,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    output: Option<Value>,
    error: Option<String>,
}

impl ReplicateProvider {
    pub fn new(
        api_token: String,
        base_url: Option<String>,
        default_model: String,
        poll_policy: PollPolicy,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let base_url = base_url.unwrap_or_else(|| "https://api.replicate.com/v1".to_string());
        let client = build_http_client(&HttpClientConfig::default())?;

        Ok(Self {
            client,
            api_token,
            base_url,
            default_model,
            poll_policy,
        })
    }

    fn prepare_input(&self, request: &ImageRequest) -> Value {
        let mut input = json!({ "prompt": request.prompt });

        if let Some(reference) = &request.reference_image {
            match reference {
                ImageLocator::Url { url } => input["image_prompt"] = json!(url),
                ImageLocator::Inline { data, mime_type } => {
                    input["image_prompt"] = json!(format!("data:{};base64,{}", mime_type, data))
                }
            }
        }
        if let Some(size) = &request.size {
            // "1024x1024" style sizes map onto Replicate aspect ratios
            input["size"] = json!(size);
        }

        input
    }

    /// Output shapes vary per model: a bare URL string or a list of URLs.
    fn extract_output_url(output: &Value) -> Option<String> {
        match output {
            Value::String(url) => Some(url.clone()),
            Value::Array(items) => items.first().and_then(|v| v.as_str()).map(str::to_string),
            _ => None,
        }
    }

    async fn fetch_prediction(&self, id: &str) -> Result<Prediction, ProviderError> {
        let response = self
            .client
            .get(format!("{}/predictions/{}", self.base_url, id))
            .bearer_auth(&self.api_token)
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

#[async_trait]
impl ImageGenerator for ReplicateProvider {
    async fn generate(&self, request: ImageRequest) -> Result<GeneratedImage, ProviderError> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let body = json!({ "input": self.prepare_input(&request) });

        let response = self
            .client
            .post(format!("{}/models/{}/predictions", self.base_url, model))
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .json(&body)
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

        let created: Prediction = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(PROVIDER, e.to_string()))?;

        let prediction_id = created.id.clone();
        let settled = poll_until(PROVIDER, self.poll_policy, || {
            let id = prediction_id.clone();
            async move {
                let prediction = self.fetch_prediction(&id).await?;
                match prediction.status.as_str() {
                    "succeeded" => Ok(PollOutcome::Done(prediction)),
                    "failed" | "canceled" => Err(ProviderError::upstream(
                        PROVIDER,
                        prediction
                            .error
                            .unwrap_or_else(|| format!("prediction {}", prediction.status)),
                    )),
                    _ => Ok(PollOutcome::Pending),
                }
            }
        })
        .await?;

        let url = settled
            .output
            .as_ref()
            .and_then(Self::extract_output_url)
            .ok_or_else(|| ProviderError::malformed(PROVIDER, "prediction had no output url"))?;

        Ok(GeneratedImage {
            image: ImageLocator::url(url),
            model,
        })
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}
