use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::ai::core::client::{build_http_client, HttpClientConfig};
use crate::ai::core::providers::{PromptEnhancer, ProviderError};

const PROVIDER: &str = "anthropic";

const ENHANCEMENT_SYSTEM_PROMPT: &str = "You are a creative director for product \
photography. Rewrite the user's request into a single richly detailed image \
generation prompt: subject, composition, lighting, surface, mood, camera. \
Respond with the prompt only, no preamble.";

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

impl AnthropicProvider {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: String,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let base_url = base_url.unwrap_or_else(|| "https://api.anthropic.com/v1".to_string());
        let client = build_http_client(&HttpClientConfig::default())?;

        Ok(Self {
            client,
            api_key,
            base_url,
            model,
        })
    }
}

#[async_trait]
impl PromptEnhancer for AnthropicProvider {
    async fn enhance(&self, message: &str) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.model,
            "max_tokens": 1024,
            "system": ENHANCEMENT_SYSTEM_PROMPT,
            "messages": [{ "role": "user", "content": message }],
        });

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .header("anthropic-version", "2023-06-01")
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

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(PROVIDER, e.to_string()))?;

        let enhanced = parsed
            .content
            .into_iter()
            .find(|c| c.content_type == "text")
            .and_then(|c| c.text)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::malformed(PROVIDER, "response had no text content"))?;

        Ok(enhanced)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}
