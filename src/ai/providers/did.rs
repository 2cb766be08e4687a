use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::ai::core::client::{build_http_client, HttpClientConfig};
use crate::ai::core::poll::{poll_until, PollOutcome, PollPolicy};
use crate::ai::core::providers::{ProviderError, TalkRequest, TalkResult, TalkSynthesizer};

const PROVIDER: &str = "d-id";

#[derive(Debug, Clone)]
pub struct DidProvider {
    client: Client,
    api_key: String,
    base_url: String,
    poll_policy: PollPolicy,
}

#[derive(Debug, Deserialize)]
struct Talk {
    id: String,
    status: String,
    result_url: Option<String>,
    error: Option<serde_json::Value>,
}

impl DidProvider {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        poll_policy: PollPolicy,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let base_url = base_url.unwrap_or_else(|| "https://api.d-id.com".to_string());
        let client = build_http_client(&HttpClientConfig::default())?;

        Ok(Self {
            client,
            api_key,
            base_url,
            poll_policy,
        })
    }

    async fn fetch_talk(&self, id: &str) -> Result<Talk, ProviderError> {
        let response = self
            .client
            .get(format!("{}/talks/{}", self.base_url, id))
            .header("Authorization", format!("Basic {}", self.api_key))
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
impl TalkSynthesizer for DidProvider {
    async fn synthesize(&self, request: TalkRequest) -> Result<TalkResult, ProviderError> {
        let voice = request
            .voice
            .unwrap_or_else(|| "en-US-JennyNeural".to_string());
        let body = json!({
            "source_url": request.image_url,
            "script": {
                "type": "text",
                "input": request.script_text,
                "provider": { "type": "microsoft", "voice_id": voice },
            },
        });

        let response = self
            .client
            .post(format!("{}/talks", self.base_url))
            .header("Authorization", format!("Basic {}", self.api_key))
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

        let created: Talk = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(PROVIDER, e.to_string()))?;

        let talk_id = created.id.clone();
        let settled = poll_until(PROVIDER, self.poll_policy, || {
            let id = talk_id.clone();
            async move {
                let talk = self.fetch_talk(&id).await?;
                match talk.status.as_str() {
                    "done" => Ok(PollOutcome::Done(talk)),
                    "error" | "rejected" => Err(ProviderError::upstream(
                        PROVIDER,
                        talk.error
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| format!("talk {}", talk.status)),
                    )),
                    _ => Ok(PollOutcome::Pending),
                }
            }
        })
        .await?;

        let result_url = settled
            .result_url
            .ok_or_else(|| ProviderError::malformed(PROVIDER, "talk finished without result_url"))?;

        Ok(TalkResult {
            talk_id: settled.id,
            result_url,
        })
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}
