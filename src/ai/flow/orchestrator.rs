//! Conversation orchestrator: validates one inbound message, routes it
//! to the right capability, executes the calls, and assembles a single
//! response envelope while maintaining the session's bounded history and
//! reference-image state.

use std::sync::Arc;
use thiserror::Error;

use crate::ai::core::providers::{
    ChatCompletionProvider, ChatMessage, CompletionRequest, FileSearchOptions, ImageGenerator,
    ImageLocator, ImageRequest, PromptEnhancer, ProviderError, SearchProvider, WebSearchOptions,
};

use super::classifier::{classify, RouteKind};
use super::envelope::{Envelope, SideChannels};
use super::memory::{ConversationTurn, Role};
use super::session::ChatSession;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("message is required")]
    EmptyMessage,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// The capability set the orchestrator dispatches into. All trait
/// objects so routes and tests can swap implementations.
pub struct Capabilities {
    pub chat: Arc<dyn ChatCompletionProvider>,
    pub enhancer: Arc<dyn PromptEnhancer>,
    pub image: Arc<dyn ImageGenerator>,
    pub search: Arc<dyn SearchProvider>,
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorRequest {
    pub message: String,
    pub reference_image: Option<ImageLocator>,
    pub web_search: Option<WebSearchOptions>,
    pub file_search: Option<FileSearchOptions>,
    pub history: Option<Vec<ConversationTurn>>,
}

pub struct Orchestrator {
    caps: Arc<Capabilities>,
}

impl Orchestrator {
    pub fn new(caps: Arc<Capabilities>) -> Self {
        Self { caps }
    }

    /// Handle one message against a session. Exactly one primary
    /// provider call on the success path (plus the mandatory enhancement
    /// call on the image path); any required-step failure propagates and
    /// leaves no partial envelope. The user and assistant turns are
    /// appended to the session log only after the envelope is complete.
    pub async fn process_message(
        &self,
        session: &mut ChatSession,
        request: OrchestratorRequest,
    ) -> Result<Envelope, FlowError> {
        let message = request.message.trim().to_string();
        if message.is_empty() {
            return Err(FlowError::EmptyMessage);
        }

        let decision = classify(&message);
        tracing::debug!(
            route = ?decision.route,
            matched_rule = decision.matched_rule,
            "classified message"
        );

        let envelope = match decision.route {
            RouteKind::Chat => self.run_chat(session, &message, &request).await?,
            RouteKind::ImageGenerate => {
                self.run_image(session, &message, request.reference_image.clone())
                    .await?
            }
        };

        session
            .log
            .push(ConversationTurn::new(Role::User, message));
        session
            .log
            .push(ConversationTurn::new(Role::Assistant, envelope.assistant_content()));

        Ok(envelope)
    }

    async fn run_chat(
        &self,
        session: &ChatSession,
        message: &str,
        request: &OrchestratorRequest,
    ) -> Result<Envelope, FlowError> {
        // Caller-supplied history overrides the session's own turns
        let prior: Vec<ConversationTurn> = match &request.history {
            Some(history) if !history.is_empty() => history.clone(),
            _ => session.log.turns(),
        };

        let mut messages: Vec<ChatMessage> = prior
            .iter()
            .map(|t| ChatMessage::new(t.role.as_str(), t.content.clone()))
            .collect();
        messages.push(ChatMessage::new("user", message));

        let web = request.web_search.as_ref().filter(|o| !o.is_empty());
        let file = request.file_search.as_ref().filter(|o| !o.is_empty());

        if web.is_some() || file.is_some() {
            let outcome = self.caps.search.search(&messages, web, file).await?;
            return Ok(Envelope::text(
                outcome.content,
                SideChannels {
                    web_search_calls: outcome.web_search_calls,
                    file_search_calls: outcome.file_search_calls,
                    function_calls: outcome.function_calls,
                    structured_data: None,
                    usage: outcome.usage,
                },
            ));
        }

        let response = self
            .caps
            .chat
            .complete(CompletionRequest {
                messages,
                ..Default::default()
            })
            .await?;

        Ok(Envelope::text(
            response.content,
            SideChannels {
                usage: response.usage,
                ..Default::default()
            },
        ))
    }

    async fn run_image(
        &self,
        session: &mut ChatSession,
        message: &str,
        explicit_reference: Option<ImageLocator>,
    ) -> Result<Envelope, FlowError> {
        // Enhancement is mandatory; generation only runs on its success
        let enhanced = self.caps.enhancer.enhance(message).await?;

        let reference_image = explicit_reference.or_else(|| session.images.latest().cloned());

        let generated = self
            .caps
            .image
            .generate(ImageRequest {
                prompt: enhanced.clone(),
                reference_image,
                model: None,
                size: None,
            })
            .await?;

        session.images.push(generated.image.clone());

        Ok(Envelope::image(
            &generated.image,
            enhanced,
            SideChannels::default(),
        ))
    }
}
