use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::ai::core::client::{build_http_client, HttpClientConfig};
use crate::ai::core::providers::{
    ProviderError, Usage, VisionInput, VisionProvider, VisionResponse,
};

const PROVIDER: &str = "google";

const DEFAULT_VISION_PROMPT: &str =
    "Describe this image in detail, including subject, setting, and style.";

#[derive(Debug, Clone)]
pub struct GoogleAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u32>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u32>,
    #[serde(rename = "totalTokenCount")]
    total_token_count: Option<u32>,
}

impl GoogleAiProvider {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: String,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let base_url = base_url
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());
        let client = build_http_client(&HttpClientConfig::default())?;

        Ok(Self {
            client,
            api_key,
            base_url,
            model,
        })
    }

    /// The generateContent API only takes inline data, so remote URLs are
    /// fetched and re-encoded before the call.
    async fn resolve_inline_data(
        &self,
        input: VisionInput,
    ) -> Result<(String, String), ProviderError> {
        match input {
            VisionInput::Base64 { data, mime_type } => Ok((data, mime_type)),
            VisionInput::Url(url) => {
                let response = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| ProviderError::upstream(PROVIDER, e.to_string()))?;

                if !response.status().is_success() {
                    return Err(ProviderError::upstream(
                        PROVIDER,
                        format!("image fetch returned {}", response.status()),
                    ));
                }

                let mime_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("image/jpeg")
                    .to_string();
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| ProviderError::upstream(PROVIDER, e.to_string()))?;

                let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
                Ok((data, mime_type))
            }
        }
    }
}

#[async_trait]
impl VisionProvider for GoogleAiProvider {
    async fn describe(
        &self,
        input: VisionInput,
        prompt: Option<String>,
    ) -> Result<VisionResponse, ProviderError> {
        let (data, mime_type) = self.resolve_inline_data(input).await?;
        let prompt = prompt.unwrap_or_else(|| DEFAULT_VISION_PROMPT.to_string());

        let body: Value = json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    { "inline_data": { "mime_type": mime_type, "data": data } }
                ]
            }]
        });

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let response = self
            .client
            .post(&url)
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

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(PROVIDER, e.to_string()))?;

        let description = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ProviderError::malformed(PROVIDER, "response had no candidates"))?;

        Ok(VisionResponse {
            description,
            model: self.model.clone(),
            usage: parsed.usage_metadata.map(|u| Usage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            }),
        })
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}
