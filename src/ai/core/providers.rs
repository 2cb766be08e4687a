//! Normalized provider contracts.
//!
//! The orchestrator and route handlers only see these traits and types;
//! each adapter in `ai::providers` owns the payload shaping for its wire
//! format.

use async_trait::async_trait;
use futures_util::Stream;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

/// Failure from a third-party capability call. The upstream message is
/// carried verbatim so the route boundary can classify it.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{message}")]
    Upstream {
        provider: &'static str,
        message: String,
    },

    #[error("malformed response: {message}")]
    Malformed {
        provider: &'static str,
        message: String,
    },

    #[error("job did not finish within {attempts} polls")]
    Timeout {
        provider: &'static str,
        attempts: u32,
    },
}

impl ProviderError {
    pub fn upstream(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider,
            message: message.into(),
        }
    }

    pub fn malformed(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Malformed {
            provider,
            message: message.into(),
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            Self::Upstream { provider, .. }
            | Self::Malformed { provider, .. }
            | Self::Timeout { provider, .. } => provider,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// One incremental piece of a streamed completion.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct StreamChunk {
    pub delta: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// Locator for an image usable as generation context or output: either a
/// provider-hosted URL or inline base64 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageLocator {
    Url { url: String },
    Inline { data: String, mime_type: String },
}

impl ImageLocator {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    pub fn as_url(&self) -> Option<&str> {
        match self {
            Self::Url { url } => Some(url),
            Self::Inline { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub reference_image: Option<ImageLocator>,
    pub model: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub image: ImageLocator,
    pub model: String,
}

#[derive(Debug, Clone)]
pub enum VisionInput {
    Url(String),
    Base64 { data: String, mime_type: String },
}

#[derive(Debug, Clone)]
pub struct VisionResponse {
    pub description: String,
    pub model: String,
    pub usage: Option<Usage>,
}

/// Caller-supplied toggles for the web-search side channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct WebSearchOptions {
    pub query: Option<String>,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
}

impl WebSearchOptions {
    pub fn is_empty(&self) -> bool {
        self.query.is_none() && self.allowed_domains.is_empty()
    }
}

/// Caller-supplied toggles for the file-search side channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FileSearchOptions {
    #[serde(default)]
    pub vector_store_ids: Vec<String>,
    pub max_results: Option<u32>,
}

impl FileSearchOptions {
    pub fn is_empty(&self) -> bool {
        self.vector_store_ids.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WebSearchCall {
    pub id: String,
    pub status: String,
    pub query: Option<String>,
    #[serde(default)]
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FileSearchCall {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default)]
    pub results: Vec<FileSearchResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FileSearchResult {
    pub file_id: String,
    pub filename: Option<String>,
    pub score: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    pub status: String,
}

/// Result of one tool-enabled completion: the answer text plus the
/// structured call records produced along the way.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub content: String,
    pub web_search_calls: Vec<WebSearchCall>,
    pub file_search_calls: Vec<FileSearchCall>,
    pub function_calls: Vec<FunctionCall>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone)]
pub struct TalkRequest {
    pub image_url: String,
    pub script_text: String,
    pub voice: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TalkResult {
    pub talk_id: String,
    pub result_url: String,
}

#[async_trait]
pub trait ChatCompletionProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest)
        -> Result<CompletionResponse, ProviderError>;

    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, ProviderError>;

    fn provider_name(&self) -> &'static str;
}

#[async_trait]
pub trait PromptEnhancer: Send + Sync {
    /// Rewrite a raw user message into a richer generation prompt.
    async fn enhance(&self, message: &str) -> Result<String, ProviderError>;

    fn provider_name(&self) -> &'static str;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: ImageRequest) -> Result<GeneratedImage, ProviderError>;

    fn provider_name(&self) -> &'static str;
}

#[async_trait]
pub trait VisionProvider: Send + Sync {
    async fn describe(
        &self,
        input: VisionInput,
        prompt: Option<String>,
    ) -> Result<VisionResponse, ProviderError>;

    fn provider_name(&self) -> &'static str;
}

/// One tool-enabled completion covering whichever search side channels
/// the caller toggled. Both option sets may be present; the adapter
/// issues a single upstream call with the union of tools.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        messages: &[ChatMessage],
        web: Option<&WebSearchOptions>,
        file: Option<&FileSearchOptions>,
    ) -> Result<SearchOutcome, ProviderError>;

    fn provider_name(&self) -> &'static str;
}

#[async_trait]
pub trait TalkSynthesizer: Send + Sync {
    async fn synthesize(&self, request: TalkRequest) -> Result<TalkResult, ProviderError>;

    fn provider_name(&self) -> &'static str;
}
