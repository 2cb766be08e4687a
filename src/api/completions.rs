//! Text-completion route: plain JSON response, or SSE streaming when
//! requested, terminated by a final metadata chunk.

use axum::response::sse::{Event, KeepAlive};
use axum::{
    extract::State,
    http::StatusCode,
    response::{AppendHeaders, IntoResponse, Response, Sse},
    Json,
};
use futures_util::StreamExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::ai::core::providers::{ChatMessage, CompletionRequest, Usage};
use crate::api::errors::AppError;
use crate::api::state::AppState;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CompletionApiRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CompletionApiResponse {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub metadata: CompletionMetadata,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CompletionMetadata {
    pub provider: String,
    pub model: String,
}

const VALID_ROLES: &[&str] = &["system", "user", "assistant"];

fn validate(request: &CompletionApiRequest) -> Result<(), AppError> {
    if request.messages.is_empty() {
        return Err(AppError::invalid_input("messages must not be empty"));
    }
    for message in &request.messages {
        if !VALID_ROLES.contains(&message.role.as_str()) {
            return Err(AppError::invalid_input(format!(
                "invalid message role: {}",
                message.role
            )));
        }
        if message.content.trim().is_empty() {
            return Err(AppError::invalid_input("message content must not be empty"));
        }
    }
    Ok(())
}

pub async fn complete(
    State(state): State<AppState>,
    Json(request): Json<CompletionApiRequest>,
) -> Result<Response, AppError> {
    validate(&request)?;

    let provider = state.caps.chat.provider_name().to_string();
    let completion_request = CompletionRequest {
        messages: request.messages.clone(),
        model: request.model.clone(),
        max_tokens: request.max_tokens,
        temperature: request.temperature,
    };

    if request.stream {
        return stream_completion(state, completion_request, provider).await;
    }

    let response = state
        .caps
        .chat
        .complete(completion_request)
        .await
        .map_err(|e| AppError::from_provider(&e))?;

    let headers = AppendHeaders([
        ("x-quelle-provider", provider.clone()),
        ("x-quelle-model", response.model.clone()),
    ]);

    Ok((
        StatusCode::OK,
        headers,
        Json(CompletionApiResponse {
            content: response.content,
            usage: response.usage,
            metadata: CompletionMetadata {
                provider,
                model: response.model,
            },
        }),
    )
        .into_response())
}

async fn stream_completion(
    state: AppState,
    request: CompletionRequest,
    provider: String,
) -> Result<Response, AppError> {
    let model = request
        .model
        .clone()
        .unwrap_or_else(|| crate::config::CHAT_MODEL.clone());

    let mut upstream = state
        .caps
        .chat
        .complete_stream(request)
        .await
        .map_err(|e| AppError::from_provider(&e))?;

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Result<Event, std::convert::Infallible>>();

    tokio::spawn(async move {
        let mut usage: Option<Usage> = None;

        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(chunk) => {
                    if chunk.usage.is_some() {
                        usage = chunk.usage.clone();
                    }
                    if let Some(delta) = &chunk.delta {
                        let event = Event::default().data(json!({ "delta": delta }).to_string());
                        if tx.send(Ok(event)).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "completion stream failed");
                    let event =
                        Event::default().data(json!({ "error": e.to_string() }).to_string());
                    let _ = tx.send(Ok(event));
                    return;
                }
            }
        }

        // Final metadata chunk closes the stream
        let event = Event::default().data(
            json!({
                "done": true,
                "usage": usage,
                "metadata": { "provider": provider, "model": model },
            })
            .to_string(),
        );
        let _ = tx.send(Ok(event));
    });

    let stream = UnboundedReceiverStream::new(rx);
    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response())
}
