//! Shared application state passed to handlers via axum's State
//! extractor. All capability slots are trait objects so tests can swap
//! in mocks.

use std::sync::Arc;
use std::time::Instant;

use crate::ai::core::poll::PollPolicy;
use crate::ai::core::providers::{TalkSynthesizer, VisionProvider};
use crate::ai::flow::{Capabilities, Orchestrator, SessionRegistry};
use crate::ai::providers::{
    AnthropicProvider, DidProvider, GoogleAiProvider, OpenAiProvider, ReplicateProvider,
};
use crate::payments::{PgSubscriptionStore, StripeClient, SubscriptionStore};

#[derive(Clone)]
pub struct AppState {
    pub caps: Arc<Capabilities>,
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<SessionRegistry>,
    pub vision: Arc<dyn VisionProvider>,
    pub talks: Arc<dyn TalkSynthesizer>,
    pub stripe: Option<Arc<StripeClient>>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub webhook_secret: Option<String>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        caps: Arc<Capabilities>,
        sessions: SessionRegistry,
        vision: Arc<dyn VisionProvider>,
        talks: Arc<dyn TalkSynthesizer>,
        stripe: Option<Arc<StripeClient>>,
        subscriptions: Arc<dyn SubscriptionStore>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            orchestrator: Arc::new(Orchestrator::new(caps.clone())),
            caps,
            sessions: Arc::new(sessions),
            vision,
            talks,
            stripe,
            subscriptions,
            webhook_secret,
            start_time: Instant::now(),
        }
    }

    /// Wire the production provider set from environment configuration.
    pub fn from_config() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let poll_policy = PollPolicy::from_config();

        let openai = Arc::new(OpenAiProvider::new(
            crate::config::OPENAI_API_KEY.clone().unwrap_or_default(),
            None,
            crate::config::CHAT_MODEL.clone(),
        )?);
        let anthropic = Arc::new(AnthropicProvider::new(
            crate::config::ANTHROPIC_API_KEY.clone().unwrap_or_default(),
            None,
            crate::config::ENHANCE_MODEL.clone(),
        )?);
        let replicate = Arc::new(ReplicateProvider::new(
            crate::config::REPLICATE_API_TOKEN.clone().unwrap_or_default(),
            None,
            crate::config::IMAGE_MODEL.clone(),
            poll_policy,
        )?);
        let google = Arc::new(GoogleAiProvider::new(
            crate::config::GOOGLE_AI_API_KEY.clone().unwrap_or_default(),
            None,
            crate::config::VISION_MODEL.clone(),
        )?);
        let did = Arc::new(DidProvider::new(
            crate::config::DID_API_KEY.clone().unwrap_or_default(),
            None,
            poll_policy,
        )?);

        let caps = Arc::new(Capabilities {
            chat: openai.clone(),
            enhancer: anthropic,
            image: replicate,
            search: openai.clone(),
        });

        let stripe = crate::config::STRIPE_SECRET_KEY
            .clone()
            .map(|key| StripeClient::new(key, None).map(Arc::new))
            .transpose()?;

        Ok(Self::new(
            caps,
            SessionRegistry::from_config(),
            google,
            did,
            stripe,
            Arc::new(PgSubscriptionStore),
            crate::config::STRIPE_WEBHOOK_SECRET.clone(),
        ))
    }
}
