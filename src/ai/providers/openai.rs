use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::ai::core::client::{build_http_client, HttpClientConfig};
use crate::ai::core::providers::{
    ChatCompletionProvider, ChatMessage, CompletionRequest, CompletionResponse, CompletionStream,
    FileSearchCall, FileSearchOptions, FileSearchResult, FunctionCall, ProviderError,
    SearchOutcome, SearchProvider, StreamChunk, Usage, WebSearchCall, WebSearchOptions,
};

const PROVIDER: &str = "openai";

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    model: Option<String>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

impl From<OpenAiUsage> for Usage {
    fn from(u: OpenAiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamResponse {
    choices: Vec<OpenAiStreamChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
}

impl OpenAiProvider {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        default_model: String,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let base_url = base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let client = build_http_client(&HttpClientConfig::default())?;

        Ok(Self {
            client,
            api_key,
            base_url,
            default_model,
        })
    }

    fn prepare_request(&self, request: &CompletionRequest, stream: bool) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role, "content": m.content }))
            .collect();

        let mut body = json!({
            "model": request.model.clone().unwrap_or_else(|| self.default_model.clone()),
            "messages": messages,
            "stream": stream,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if stream {
            body["stream_options"] = json!({ "include_usage": true });
        }

        body
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
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

        Ok(response)
    }
}

#[async_trait]
impl ChatCompletionProvider for OpenAiProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let body = self.prepare_request(&request, false);
        let response = self.post_json("/chat/completions", &body).await?;

        let parsed: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(PROVIDER, e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::malformed(PROVIDER, "response had no choices"))?;

        Ok(CompletionResponse {
            content,
            model: parsed.model.unwrap_or_else(|| self.default_model.clone()),
            usage: parsed.usage.map(Into::into),
        })
    }

    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, ProviderError> {
        let body = self.prepare_request(&request, true);
        let response = self.post_json("/chat/completions", &body).await?;

        // Buffer partial SSE lines across network chunks
        let mut buffer = String::new();

        let stream = response.bytes_stream().flat_map(move |result| {
            let mut chunks: Vec<Result<StreamChunk, ProviderError>> = Vec::new();

            match result {
                Ok(bytes) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));

                    while let Some(line_end) = buffer.find('\n') {
                        let line = buffer[..line_end].trim().to_string();
                        buffer.drain(..=line_end);

                        let Some(json_str) = line.strip_prefix("data: ") else {
                            continue;
                        };
                        if json_str == "[DONE]" {
                            continue;
                        }

                        if let Ok(parsed) = serde_json::from_str::<OpenAiStreamResponse>(json_str) {
                            let (delta, finish_reason) = parsed
                                .choices
                                .into_iter()
                                .next()
                                .map(|c| (c.delta.content, c.finish_reason))
                                .unwrap_or((None, None));

                            let usage = parsed.usage.map(Into::into);
                            if delta.is_some() || finish_reason.is_some() || usage.is_some() {
                                chunks.push(Ok(StreamChunk {
                                    delta,
                                    finish_reason,
                                    usage,
                                }));
                            }
                        }
                    }
                }
                Err(e) => chunks.push(Err(ProviderError::upstream(PROVIDER, e.to_string()))),
            }

            futures_util::stream::iter(chunks)
        });

        Ok(Box::pin(stream))
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

// ---- Responses API: tool-enabled completions for search side channels ----

#[derive(Debug, Deserialize)]
struct ResponsesApiResponse {
    #[serde(default)]
    output: Vec<Value>,
    usage: Option<ResponsesApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ResponsesApiUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

impl OpenAiProvider {
    fn build_tools(web: Option<&WebSearchOptions>, file: Option<&FileSearchOptions>) -> Vec<Value> {
        let mut tools = Vec::new();

        if let Some(web) = web {
            let mut tool = json!({ "type": "web_search" });
            if !web.allowed_domains.is_empty() {
                tool["filters"] = json!({ "allowed_domains": web.allowed_domains });
            }
            tools.push(tool);
        }

        if let Some(file) = file {
            let mut tool = json!({
                "type": "file_search",
                "vector_store_ids": file.vector_store_ids,
            });
            if let Some(max_results) = file.max_results {
                tool["max_num_results"] = json!(max_results);
            }
            tools.push(tool);
        }

        tools
    }

    fn collect_output(
        outcome: &mut SearchOutcome,
        items: Vec<Value>,
        web: Option<&WebSearchOptions>,
    ) {
        for item in items {
            let id = item["id"].as_str().unwrap_or_default().to_string();
            let status = item["status"].as_str().unwrap_or("completed").to_string();

            match item["type"].as_str() {
                Some("web_search_call") => {
                    let query = item["action"]["query"]
                        .as_str()
                        .map(str::to_string)
                        .or_else(|| web.and_then(|w| w.query.clone()));
                    outcome.web_search_calls.push(WebSearchCall {
                        id,
                        status,
                        query,
                        domains: web.map(|w| w.allowed_domains.clone()).unwrap_or_default(),
                    });
                }
                Some("file_search_call") => {
                    let queries = item["queries"]
                        .as_array()
                        .map(|qs| {
                            qs.iter()
                                .filter_map(|q| q.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default();
                    let results = item["results"]
                        .as_array()
                        .map(|rs| {
                            rs.iter()
                                .map(|r| FileSearchResult {
                                    file_id: r["file_id"].as_str().unwrap_or_default().to_string(),
                                    filename: r["filename"].as_str().map(str::to_string),
                                    score: r["score"].as_f64().map(|s| s as f32),
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    outcome.file_search_calls.push(FileSearchCall {
                        id,
                        status,
                        queries,
                        results,
                    });
                }
                Some("function_call") => {
                    let arguments = item["arguments"]
                        .as_str()
                        .and_then(|a| serde_json::from_str(a).ok())
                        .unwrap_or(Value::Null);
                    outcome.function_calls.push(FunctionCall {
                        id,
                        name: item["name"].as_str().unwrap_or_default().to_string(),
                        arguments,
                        status,
                    });
                }
                Some("message") => {
                    if let Some(parts) = item["content"].as_array() {
                        for part in parts {
                            if let Some(text) = part["text"].as_str() {
                                if !outcome.content.is_empty() {
                                    outcome.content.push('\n');
                                }
                                outcome.content.push_str(text);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

#[async_trait]
impl SearchProvider for OpenAiProvider {
    async fn search(
        &self,
        messages: &[ChatMessage],
        web: Option<&WebSearchOptions>,
        file: Option<&FileSearchOptions>,
    ) -> Result<SearchOutcome, ProviderError> {
        let input: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": m.role, "content": m.content }))
            .collect();

        let body = json!({
            "model": self.default_model,
            "input": input,
            "tools": Self::build_tools(web, file),
        });

        let response = self.post_json("/responses", &body).await?;
        let parsed: ResponsesApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(PROVIDER, e.to_string()))?;

        let mut outcome = SearchOutcome {
            usage: parsed.usage.map(|u| Usage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.total_tokens,
            }),
            ..Default::default()
        };
        Self::collect_output(&mut outcome, parsed.output, web);

        Ok(outcome)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}
