//! Conversation orchestration routes: one POST per message, plus
//! accessors for the session's bounded history and reference images and
//! an explicit reset.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ai::core::providers::{
    FileSearchOptions, ImageLocator, WebSearchOptions,
};
use crate::ai::flow::memory::{ConversationTurn, Role};
use crate::ai::flow::{Envelope, FlowError, OrchestratorRequest};
use crate::api::errors::{ApiResult, AppError};
use crate::api::state::AppState;
use crate::database::models::NewChatMessage;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ChatOrchestrationRequest {
    pub message: Option<String>,
    pub chat_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub reference_image_url: Option<String>,
    pub web_search: Option<WebSearchOptions>,
    pub file_search: Option<FileSearchOptions>,
    pub history: Option<Vec<TurnInput>>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TurnInput {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ChatOrchestrationResponse {
    pub success: bool,
    pub chat_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub envelope: Envelope,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionQuery {
    pub chat_id: Option<Uuid>,
    /// DELETE only: also discard the reference-image set.
    #[serde(default)]
    pub images: bool,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct SessionStateResponse {
    pub history: Vec<ConversationTurn>,
    pub reference_images: Vec<ImageLocator>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ClearResponse {
    pub success: bool,
    pub message: String,
}

pub async fn orchestrate(
    State(state): State<AppState>,
    Json(request): Json<ChatOrchestrationRequest>,
) -> ApiResult<Json<ChatOrchestrationResponse>> {
    let message = request
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AppError::missing_field("message"))?
        .to_string();

    let flow_request = OrchestratorRequest {
        message: message.clone(),
        reference_image: request.reference_image_url.clone().map(ImageLocator::url),
        web_search: request.web_search.clone(),
        file_search: request.file_search.clone(),
        history: request.history.as_ref().map(|turns| {
            turns
                .iter()
                .map(|t| ConversationTurn::new(t.role, t.content.clone()))
                .collect()
        }),
    };

    let (chat_id, session) = state.sessions.checkout(request.chat_id).await;
    let mut session = session.lock().await;
    session.touch();

    let envelope = state
        .orchestrator
        .process_message(&mut session, flow_request)
        .await
        .map_err(|e| match e {
            FlowError::EmptyMessage => AppError::missing_field("message"),
            FlowError::Provider(err) => AppError::from_provider(&err),
        })?;
    drop(session);

    if let Some(user_id) = request.user_id {
        record_turns(chat_id, user_id, &message, &envelope).await;
    }

    Ok((
        StatusCode::OK,
        Json(ChatOrchestrationResponse {
            success: true,
            chat_id,
            timestamp: Utc::now(),
            envelope,
        }),
    ))
}

pub async fn get_session_state(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> ApiResult<Json<SessionStateResponse>> {
    let (history, reference_images) = match query.chat_id {
        Some(chat_id) => match state.sessions.get(chat_id).await {
            Some(session) => {
                let session = session.lock().await;
                (session.log.turns(), session.images.all())
            }
            None => (Vec::new(), Vec::new()),
        },
        None => (Vec::new(), Vec::new()),
    };

    Ok((
        StatusCode::OK,
        Json(SessionStateResponse {
            history,
            reference_images,
            timestamp: Utc::now(),
        }),
    ))
}

pub async fn clear_session(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> ApiResult<Json<ClearResponse>> {
    let cleared = match query.chat_id {
        Some(chat_id) => match state.sessions.get(chat_id).await {
            Some(session) => {
                let mut session = session.lock().await;
                session.log.clear();
                // Reference images have an independent lifecycle; only an
                // explicit request discards them
                if query.images {
                    session.images.clear();
                }
                session.touch();
                true
            }
            None => false,
        },
        None => false,
    };

    let message = match (cleared, query.images) {
        (true, true) => "history and reference images cleared".to_string(),
        (true, false) => "history cleared".to_string(),
        (false, _) => "no active session".to_string(),
    };

    Ok((
        StatusCode::OK,
        Json(ClearResponse {
            success: true,
            message,
        }),
    ))
}

/// Mirror the exchanged turns into the database when the caller is
/// identified and persistence is configured. Failures here are logged
/// and never fail the orchestration response.
async fn record_turns(chat_id: Uuid, user_id: Uuid, message: &str, envelope: &Envelope) {
    if crate::database::maybe_pool().is_none() {
        return;
    }

    let title: String = message.chars().take(80).collect();
    if let Err(e) = crate::database::queries::chats::ensure_chat(chat_id, user_id, &title).await {
        tracing::warn!(error = %e, %chat_id, "failed to ensure chat row");
        return;
    }

    let (image_url, image_base64) = match envelope {
        Envelope::Image {
            image_url,
            image_data,
            ..
        } => (image_url.clone(), image_data.clone()),
        Envelope::Text { .. } => (None, None),
    };

    let rows = [
        NewChatMessage {
            chat_id,
            user_id,
            role: Role::User.as_str().to_string(),
            content: message.to_string(),
            image_url: None,
            image_base64: None,
        },
        NewChatMessage {
            chat_id,
            user_id,
            role: Role::Assistant.as_str().to_string(),
            content: envelope.assistant_content(),
            image_url,
            image_base64,
        },
    ];

    for row in rows {
        if let Err(e) = crate::database::queries::chats::insert_message(row).await {
            tracing::warn!(error = %e, %chat_id, "failed to record chat message");
        }
    }
}
